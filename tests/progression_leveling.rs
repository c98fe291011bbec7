use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use heroledger::progression::{LevelTuning, ProgressionError, ProgressionModel, Stat};

fn fresh() -> ProgressionModel {
    let mut model = ProgressionModel::new(LevelTuning::default());
    model.initialize("p1", "Pia");
    model
}

#[test]
fn thresholds_grow_and_are_deterministic() {
    for tuning in [
        LevelTuning::default(),
        LevelTuning::new(50, 1.1, 1).unwrap(),
        LevelTuning::new(1000, 2.0, 5).unwrap(),
    ] {
        let mut previous = 0;
        for level in 1..=40 {
            let required = tuning.required_exp_for_level(level);
            assert!(required > previous, "level {level} did not grow");
            assert_eq!(required, tuning.required_exp_for_level(level));
            previous = required;
        }
    }
}

#[test]
fn experience_stays_below_threshold_over_any_sequence() {
    let mut model = fresh();
    let amounts = [0, 1, 99, 7, 150, 1_000, 3, 12_345, 0, 42, 250, 99_999];
    for amount in amounts {
        let before = (model.level(), model.available_skill_points());
        let gained = model.add_experience(amount).unwrap();
        assert!(model.experience() < model.required_exp_for_next_level());
        assert_eq!(model.level(), before.0 + gained);
        assert_eq!(model.available_skill_points(), before.1 + gained * 3);
    }
}

#[test]
fn two_hundred_fifty_experience_reaches_level_three() {
    let mut model = fresh();
    let changes = Arc::new(AtomicUsize::new(0));
    let seen = changes.clone();
    model.subscribe(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(model.add_experience(250).unwrap(), 2);
    assert_eq!(model.level(), 3);
    assert_eq!(model.experience(), 0);
    assert_eq!(model.available_skill_points(), 6);
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[test]
fn allocation_moves_points_into_one_stat() {
    let mut model = fresh();
    model.add_experience(100).unwrap();
    assert_eq!(model.available_skill_points(), 3);

    let total_before = model.available_skill_points()
        + Stat::ALL.iter().map(|s| model.stat(*s)).sum::<u32>();
    assert_eq!(model.assign_skill_point(Stat::Defense, 2).unwrap(), 12);
    let total_after = model.available_skill_points()
        + Stat::ALL.iter().map(|s| model.stat(*s)).sum::<u32>();
    assert_eq!(total_before, total_after);
    assert_eq!(model.strength(), 10);
    assert_eq!(model.agility(), 10);
}

#[test]
fn insufficient_points_change_nothing_and_stay_silent() {
    let mut model = fresh();
    let changes = Arc::new(AtomicUsize::new(0));
    let seen = changes.clone();
    let id = model.subscribe(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!model.can_assign_skill_point(Stat::Agility, 1));
    assert_eq!(
        model.assign_skill_point(Stat::Agility, 1),
        Err(ProgressionError::InsufficientSkillPoints {
            requested: 1,
            available: 0
        })
    );
    assert_eq!(model.agility(), 10);
    assert_eq!(changes.load(Ordering::SeqCst), 0);

    assert!(model.unsubscribe(id));
    model.add_experience(10).unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 0);
}

#[test]
fn reinitialize_resets_progress() {
    let mut model = fresh();
    model.add_experience(500).unwrap();
    model.assign_skill_point(Stat::Strength, 1).unwrap();
    model.initialize("p2", "Quin");
    assert_eq!(model.player_id(), "p2");
    assert_eq!(model.level(), 1);
    assert_eq!(model.experience(), 0);
    assert_eq!(model.available_skill_points(), 0);
    assert_eq!(model.strength(), 10);
}
