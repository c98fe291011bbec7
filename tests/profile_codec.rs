use heroledger::progression::{
    LevelTuning, PersistedRecord, ProfileCodec, ProgressionModel, Stat, VersionMismatch,
};

fn codec(version: &str) -> ProfileCodec {
    ProfileCodec::new(version, LevelTuning::default())
}

#[test]
fn json_round_trip_preserves_the_model() {
    let tuning = LevelTuning::new(120, 1.35, 4).unwrap();
    let mut model = ProgressionModel::new(tuning);
    model.initialize("r1", "Rae");
    model.add_experience(400).unwrap();
    model.assign_skill_point(Stat::Agility, 3).unwrap();

    let encoded = codec("3.0.0").encode(&model);
    let json = encoded.to_json().unwrap();
    let record = PersistedRecord::from_json(&json).unwrap();
    assert_eq!(record, encoded);
    let decoded = codec("3.0.0").decode(&record);
    let restored = decoded.model;

    assert!(decoded.version_mismatch.is_none());
    assert!(!decoded.tuning_replaced);
    assert_eq!(decoded.normalized_levels, 0);
    assert_eq!(restored.player_id(), "r1");
    assert_eq!(restored.player_name(), "Rae");
    assert_eq!(restored.level(), model.level());
    assert_eq!(restored.experience(), model.experience());
    assert_eq!(
        restored.available_skill_points(),
        model.available_skill_points()
    );
    for stat in Stat::ALL {
        assert_eq!(restored.stat(stat), model.stat(stat));
    }
    assert_eq!(restored.tuning(), &tuning);
    assert_eq!(codec("3.0.0").encode(&restored), encoded);
}

#[test]
fn older_version_is_reported_not_rejected() {
    let mut model = ProgressionModel::new(LevelTuning::default());
    model.initialize("r2", "Sol");
    let record = codec("1.0.0").encode(&model);

    let decoded = codec("1.1.0").decode(&record);
    assert_eq!(
        decoded.version_mismatch,
        Some(VersionMismatch {
            stored: "1.0.0".to_string(),
            current: "1.1.0".to_string()
        })
    );
    assert_eq!(decoded.model.player_id(), "r2");
}

#[test]
fn partial_records_take_defaults() {
    let record =
        PersistedRecord::from_json(r#"{"player_id":"r3","level":5,"strength":20}"#).unwrap();
    let decoded = codec("1.0.0").decode(&record);
    let model = decoded.model;
    assert_eq!(model.level(), 5);
    assert_eq!(model.strength(), 20);
    assert_eq!(model.defense(), 10);
    assert_eq!(model.experience(), 0);
    assert_eq!(model.player_name(), "");
    assert!(decoded.tuning_replaced);
}

#[test]
fn unknown_keys_are_ignored() {
    let record =
        PersistedRecord::from_json(r#"{"player_id":"r4","inventory":[1,2],"level":2}"#).unwrap();
    assert_eq!(record.level, Some(2));
}

#[test]
fn oversized_payloads_are_refused() {
    let padding = " ".repeat(70 * 1024);
    let json = format!("{{\"player_id\":\"r5\"{}}}", padding);
    assert!(PersistedRecord::from_json(&json).is_err());
}
