//! Reconfiguration Decider (C8) — the core state machine
//!
//! `decide` is a pure function of an `Observation` and the current
//! `MemberStatus`: no I/O, no clock access (the Observer already folded
//! "now" into `member_failure_exceeded`/`cluster_failure_exceeded`). This
//! is deliberate — it is the one part of the system exhaustively unit
//! tested, per spec.md §8's end-to-end scenario table.

use crate::clock_store::MemberStatus;
use crate::observer::Observation;
use crate::service_controller::UnitType;

/// Design Notes §9's variant type, verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Bootstrap,
    RestoreLocal,
    ReplaceFailed,
    ReloadOnly,
    NoOp(&'static str),
}

/// The action chosen, plus the supervisor unit-type write that spec.md
/// §4.1 says happens in the `¬H_cluster` branch *before* the reload the
/// action triggers. `None` when the `H_cluster` branch is taken, since
/// that branch never touches the drop-in.
pub struct Decision {
    pub action: RecoveryAction,
    pub unit_type_write: Option<UnitType>,
}

pub fn decide(obs: &Observation, status: MemberStatus) -> Decision {
    if obs.h_cluster {
        if obs.u_local {
            let action = if status == MemberStatus::Replaced {
                RecoveryAction::NoOp("replacement just finished, waiting for restart")
            } else {
                RecoveryAction::Bootstrap
            };
            Decision {
                action,
                unit_type_write: None,
            }
        } else if obs.member_failure_exceeded {
            Decision {
                action: RecoveryAction::ReplaceFailed,
                unit_type_write: None,
            }
        } else {
            Decision {
                action: RecoveryAction::NoOp("recent restart, member failure window not exceeded"),
                unit_type_write: None,
            }
        }
    } else {
        // remaining = Q - running_count + 1, spec.md §4.1.
        let q = (obs.member_count / 2 + 1) as i64;
        let remaining = q - obs.running_count as i64 + 1;
        let unit_type = UnitType::for_remaining(remaining);

        let action = if obs.running_count < obs.member_count {
            RecoveryAction::Bootstrap
        } else if obs.cluster_failure_exceeded {
            RecoveryAction::Bootstrap
        } else {
            RecoveryAction::ReloadOnly
        };

        Decision {
            action,
            unit_type_write: Some(unit_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(
        h_cluster: bool,
        u_local: bool,
        member_failure_exceeded: bool,
        cluster_failure_exceeded: bool,
        running_count: u32,
        member_count: u32,
    ) -> Observation {
        Observation {
            h_local: h_cluster,
            healthy_count: if h_cluster { member_count as usize } else { 0 },
            h_cluster,
            running_count,
            member_count,
            u_local,
            member_failure_exceeded,
            cluster_failure_exceeded,
        }
    }

    // S3: member unhealthy > limit, cluster healthy -> REPLACE_FAILED
    #[test]
    fn s3_member_failure_exceeded_replaces() {
        let o = obs(true, false, true, false, 3, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.action, RecoveryAction::ReplaceFailed);
    }

    // S4: no node ever started, all 3 running, cluster unhealthy -> BOOTSTRAP
    #[test]
    fn s4_fresh_bootstrap_when_running_count_below_n() {
        let o = obs(false, false, false, false, 2, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.action, RecoveryAction::Bootstrap);
    }

    // S5: all 3 nodes running, cluster unhealthy > limit -> BOOTSTRAP (disaster recovery)
    #[test]
    fn s5_disaster_recovery_when_cluster_failure_exceeded() {
        let o = obs(false, false, false, true, 3, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.action, RecoveryAction::Bootstrap);
    }

    // S6: cluster healthy, peer reports unstarted, status absent -> BOOTSTRAP
    #[test]
    fn s6_unstarted_with_no_prior_replacement_bootstraps() {
        let o = obs(true, true, false, false, 3, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.action, RecoveryAction::Bootstrap);
    }

    #[test]
    fn unstarted_after_replace_is_a_noop() {
        let o = obs(true, true, false, false, 3, 3);
        let d = decide(&o, MemberStatus::Replaced);
        assert_eq!(
            d.action,
            RecoveryAction::NoOp("replacement just finished, waiting for restart")
        );
    }

    #[test]
    fn healthy_cluster_no_unstarted_no_failure_is_noop() {
        let o = obs(true, false, false, false, 3, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(
            d.action,
            RecoveryAction::NoOp("recent restart, member failure window not exceeded")
        );
    }

    #[test]
    fn unhealthy_cluster_all_nodes_present_no_failure_window_reloads() {
        let o = obs(false, false, false, false, 3, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.action, RecoveryAction::ReloadOnly);
    }

    #[test]
    fn unit_type_simple_when_far_from_quorum() {
        // N=5, Q=3, running=1 -> remaining = 3 - 1 + 1 = 3 -> simple
        let o = obs(false, false, false, false, 1, 5);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.unit_type_write, Some(UnitType::Simple));
    }

    #[test]
    fn unit_type_notify_when_close_to_quorum() {
        // N=5, Q=3, running=4 -> remaining = 3 - 4 + 1 = 0 -> notify
        let o = obs(false, false, false, false, 4, 5);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.unit_type_write, Some(UnitType::Notify));
    }

    #[test]
    fn h_cluster_branch_never_writes_a_drop_in() {
        let o = obs(true, false, true, false, 3, 3);
        let d = decide(&o, MemberStatus::Absent);
        assert_eq!(d.unit_type_write, None);
    }
}
