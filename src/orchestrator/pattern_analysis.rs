//! Check-in pattern analysis producing concern flags.

use crate::models::internal::{CheckIn, ConcernFlag, ConcernType, Severity};

const HIGH_STRESS_LEVEL: i32 = 4;

/// Flags are returned in a fixed order: stress, low connection, connection
/// drop, engagement. `check_ins` must be oldest first.
pub fn analyze_check_ins(check_ins: &[CheckIn]) -> Vec<ConcernFlag> {
    let mut flags = Vec::new();

    let stress_run = longest_stress_run(check_ins);
    if stress_run >= 3 {
        flags.push(ConcernFlag::new(ConcernType::ConsecutiveStress, Severity::High));
    } else if stress_run == 2 {
        flags.push(ConcernFlag::new(ConcernType::ConsecutiveStress, Severity::Medium));
    }

    if check_ins.len() >= 2 {
        let avg = mean_connection(check_ins);
        if avg <= 2.0 {
            flags.push(ConcernFlag::new(ConcernType::LowConnection, Severity::High));
        } else if avg <= 3.0 {
            flags.push(ConcernFlag::new(ConcernType::LowConnection, Severity::Medium));
        }
    }

    if check_ins.len() >= 4 {
        let (older, newer) = check_ins.split_at(check_ins.len() / 2);
        let drop = mean_connection(older) - mean_connection(newer);
        if drop >= 1.5 {
            flags.push(ConcernFlag::new(ConcernType::ConnectionDrop, Severity::High));
        } else if drop >= 1.0 {
            flags.push(ConcernFlag::new(ConcernType::ConnectionDrop, Severity::Medium));
        }
    }

    match check_ins.len() {
        0 => flags.push(ConcernFlag::new(ConcernType::LowEngagement, Severity::Medium)),
        1 => flags.push(ConcernFlag::new(ConcernType::LowEngagement, Severity::Low)),
        _ => {}
    }

    flags
}

fn longest_stress_run(check_ins: &[CheckIn]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for check_in in check_ins {
        if check_in.stress_level >= HIGH_STRESS_LEVEL {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn mean_connection(check_ins: &[CheckIn]) -> f64 {
    if check_ins.is_empty() {
        return 0.0;
    }
    let total: i32 = check_ins.iter().map(|c| c.connection_score).sum();
    f64::from(total) / check_ins.len() as f64
}
