//! Process-wide counters for sign-in and save activity.
//! Counters only go up; callers diff two snapshots to measure an interval.
use std::sync::atomic::{AtomicU64, Ordering};

static SIGN_INS_STARTED: AtomicU64 = AtomicU64::new(0);
static SIGN_INS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static SIGN_INS_FAILED: AtomicU64 = AtomicU64::new(0);
static SIGN_INS_REJECTED: AtomicU64 = AtomicU64::new(0);
static PROFILES_CREATED: AtomicU64 = AtomicU64::new(0);
static SAVES_OK: AtomicU64 = AtomicU64::new(0);
static SAVES_FAILED: AtomicU64 = AtomicU64::new(0);
static LEVEL_UPS: AtomicU64 = AtomicU64::new(0);

pub fn inc_sign_in_started() {
    SIGN_INS_STARTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sign_in_succeeded() {
    SIGN_INS_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sign_in_failed() {
    SIGN_INS_FAILED.fetch_add(1, Ordering::Relaxed);
}
/// A sign-in arrived while another was still in flight.
pub fn inc_sign_in_rejected() {
    SIGN_INS_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_profile_created() {
    PROFILES_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_save_ok() {
    SAVES_OK.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_save_failed() {
    SAVES_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_level_ups(levels: u32) {
    LEVEL_UPS.fetch_add(u64::from(levels), Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub sign_ins_started: u64,
    pub sign_ins_succeeded: u64,
    pub sign_ins_failed: u64,
    pub sign_ins_rejected: u64,
    pub profiles_created: u64,
    pub saves_ok: u64,
    pub saves_failed: u64,
    pub level_ups: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sign_ins_started: SIGN_INS_STARTED.load(Ordering::Relaxed),
        sign_ins_succeeded: SIGN_INS_SUCCEEDED.load(Ordering::Relaxed),
        sign_ins_failed: SIGN_INS_FAILED.load(Ordering::Relaxed),
        sign_ins_rejected: SIGN_INS_REJECTED.load(Ordering::Relaxed),
        profiles_created: PROFILES_CREATED.load(Ordering::Relaxed),
        saves_ok: SAVES_OK.load(Ordering::Relaxed),
        saves_failed: SAVES_FAILED.load(Ordering::Relaxed),
        level_ups: LEVEL_UPS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_save_ok();
        inc_save_failed();
        add_level_ups(2);
        let after = snapshot();
        assert!(after.saves_ok > before.saves_ok);
        assert!(after.saves_failed > before.saves_failed);
        assert!(after.level_ups >= before.level_ups + 2);
    }
}
