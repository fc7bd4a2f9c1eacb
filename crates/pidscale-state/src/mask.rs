//! Change detection between two configuration snapshots.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use pidscale_core::TargetConfig;

/// Set of configuration groups that differ between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeMask(u8);

impl ChangeMask {
    pub const NONE: Self = Self(0);
    pub const TARGET: Self = Self(1 << 0);
    pub const PID: Self = Self(1 << 1);
    pub const KAFKA: Self = Self(1 << 2);
    pub const INTERVAL: Self = Self(1 << 3);
    pub const COOLDOWN: Self = Self(1 << 4);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::TARGET, "target"),
        (Self::PID, "pid"),
        (Self::KAFKA, "kafka"),
        (Self::INTERVAL, "interval"),
        (Self::COOLDOWN, "cooldown"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ChangeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Compare two snapshots group by group.
///
/// Pure and order-independent: `diff(a, b) == diff(b, a)`. Broker lists
/// are compared element-wise, so reordering brokers counts as a change.
pub fn diff(previous: &TargetConfig, next: &TargetConfig) -> ChangeMask {
    let mut mask = ChangeMask::NONE;
    if previous.target != next.target {
        mask |= ChangeMask::TARGET;
    }
    if previous.pid != next.pid {
        mask |= ChangeMask::PID;
    }
    if previous.kafka != next.kafka {
        mask |= ChangeMask::KAFKA;
    }
    if previous.interval != next.interval {
        mask |= ChangeMask::INTERVAL;
    }
    if previous.cooldown != next.cooldown {
        mask |= ChangeMask::COOLDOWN;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use pidscale_core::*;

    fn base() -> TargetConfig {
        TargetConfig {
            target: TargetBounds {
                deployment: "app".to_string(),
                namespace: "default".to_string(),
                min_replicas: 1,
                max_replicas: 5,
            },
            pid: PidGains {
                kp: 0.5,
                ki: 1.0,
                kd: 0.1,
                reference_signal: 100,
            },
            kafka: KafkaSettings {
                brokers: vec!["broker1".to_string()],
                topic: "topic".to_string(),
                group: "group".to_string(),
                sasl: None,
            },
            interval: 10,
            cooldown: 30,
        }
    }

    #[test]
    fn identical_snapshots_yield_empty_mask() {
        assert_eq!(diff(&base(), &base()), ChangeMask::NONE);
        assert!(diff(&base(), &base()).is_empty());
    }

    #[test]
    fn target_change() {
        let mut next = base();
        next.target.deployment = "app2".to_string();
        assert_eq!(diff(&base(), &next), ChangeMask::TARGET);
    }

    #[test]
    fn pid_change() {
        let mut next = base();
        next.pid.reference_signal = 200;
        assert_eq!(diff(&base(), &next), ChangeMask::PID);
    }

    #[test]
    fn kafka_only_change() {
        let mut next = base();
        next.kafka.brokers.push("broker2".to_string());
        assert_eq!(diff(&base(), &next), ChangeMask::KAFKA);

        let mut next = base();
        next.kafka.sasl = Some(SaslSettings {
            mechanism: SaslMechanism::Plain,
            username: "u".to_string(),
            password: "p".to_string(),
        });
        assert_eq!(diff(&base(), &next), ChangeMask::KAFKA);
    }

    #[test]
    fn interval_only_change() {
        let mut next = base();
        next.interval = 20;
        assert_eq!(diff(&base(), &next), ChangeMask::INTERVAL);
    }

    #[test]
    fn cooldown_change() {
        let mut next = base();
        next.cooldown = 60;
        assert_eq!(diff(&base(), &next), ChangeMask::COOLDOWN);
    }

    #[test]
    fn multiple_changes_combine() {
        let mut next = base();
        next.target.max_replicas = 10;
        next.kafka.topic = "other".to_string();
        next.cooldown = 5;

        let mask = diff(&base(), &next);
        assert_eq!(
            mask,
            ChangeMask::TARGET | ChangeMask::KAFKA | ChangeMask::COOLDOWN
        );
        assert!(mask.intersects(ChangeMask::KAFKA));
        assert!(!mask.intersects(ChangeMask::PID | ChangeMask::INTERVAL));
        assert_eq!(diff(&next, &base()), mask);
    }

    #[test]
    fn display_lists_flags() {
        assert_eq!(ChangeMask::NONE.to_string(), "none");
        assert_eq!(
            (ChangeMask::PID | ChangeMask::INTERVAL).to_string(),
            "pid|interval"
        );
    }
}
