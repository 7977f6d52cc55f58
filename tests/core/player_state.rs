mod fakes;

use fakes::{
    FakePermissions, FakeWebApplication, PLAYER_NAME, PRIMARY_GROUP_ID, PRIMARY_GROUP_NAME,
    USER_ID, group_ids, group_names, player_uuid, zaffre,
};
use groupbridge::core::config::Config;
use groupbridge::core::error::BridgeError;
use groupbridge::core::player::Player;
use groupbridge::core::player_state::PlayerState;
use groupbridge::core::record::{self, RecordLocation};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::tempdir;
use toml::{Table, Value};

fn players_dir(root: &Path) -> std::path::PathBuf {
    root.join("players")
}

fn state_for(
    root: &Path,
    web: &Arc<FakeWebApplication>,
    permissions: &Arc<FakePermissions>,
    user_id: &str,
) -> PlayerState {
    let env = fakes::environment(root, Arc::clone(web), Arc::clone(permissions));
    PlayerState::for_player(env, zaffre(), user_id)
}

#[test]
fn generate_fills_every_field_from_collaborators() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);

    state.generate().unwrap();

    assert_eq!(state.webapp_primary_group_id(), PRIMARY_GROUP_ID);
    assert_eq!(state.webapp_group_ids(), group_ids().as_slice());
    assert_eq!(state.permissions_system_primary_group_name(), PRIMARY_GROUP_NAME);
    assert_eq!(state.permissions_system_group_names(), group_names().as_slice());
    assert!(!state.is_new_file());
}

#[test]
fn generate_skips_primary_group_when_unsupported() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(false));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);

    state.generate().unwrap();

    assert_eq!(state.permissions_system_primary_group_name(), "");
    assert_eq!(state.permissions_system_group_names(), group_names().as_slice());
    assert_eq!(perms.primary_lookups.load(Ordering::SeqCst), 0);
}

#[test]
fn generate_failure_is_a_dependency_failure_and_keeps_fields() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.set_webapp_primary_group_id("7");
    state.webapp_group_ids_mut().push("99".into());

    web.fail(true);
    let err = state.generate().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::DependencyFailure {
            collaborator: "web application",
            ..
        }
    ));
    assert_eq!(state.webapp_primary_group_id(), "7");
    assert_eq!(state.webapp_group_ids(), ["99".to_string()].as_slice());

    web.fail(false);
    perms.fail(true);
    let err = state.generate().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::DependencyFailure {
            collaborator: "permission system",
            ..
        }
    ));
    // The web lookups succeeded this time, but nothing was assigned.
    assert_eq!(state.webapp_primary_group_id(), "7");
    assert_eq!(state.permissions_system_group_names().len(), 0);
}

#[test]
fn copy_is_equal_and_independent() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut original = state_for(tmp.path(), &web, &perms, USER_ID);
    original.generate().unwrap();

    let mut copy = original.copy();
    assert_eq!(copy, original);
    assert_eq!(copy.player(), original.player());
    assert_eq!(copy.web_user_id(), USER_ID);
    assert_eq!(copy.canonical_path(), original.canonical_path());
    assert_eq!(copy.legacy_path(), original.legacy_path());
    assert!(Arc::ptr_eq(copy.environment(), original.environment()));

    copy.webapp_group_ids_mut().push("04".into());
    copy.set_permissions_system_primary_group_name("Admin");
    assert_eq!(original.webapp_group_ids(), group_ids().as_slice());
    assert_eq!(original.permissions_system_primary_group_name(), PRIMARY_GROUP_NAME);

    original.permissions_system_group_names_mut().clear();
    assert_eq!(copy.permissions_system_group_names(), group_names().as_slice());
    assert_ne!(copy, original);
}

#[test]
fn load_without_record_marks_new_file() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.set_webapp_primary_group_id("stale");

    let location = state.load().unwrap();

    assert_eq!(location, RecordLocation::Absent);
    assert!(state.is_new_file());
    assert_eq!(state.webapp_primary_group_id(), "");
    assert!(state.webapp_group_ids().is_empty());
    assert_eq!(state.permissions_system_primary_group_name(), "");
    assert!(state.permissions_system_group_names().is_empty());
    assert_eq!(state.last_known_name(), "");
}

#[test]
fn save_then_load_round_trips_zaffre() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.generate().unwrap();
    state.save().unwrap();

    let canonical = record::canonical_record_path(&players_dir(tmp.path()), &player_uuid());
    assert_eq!(state.canonical_path(), canonical);
    let written = record::read_document(&canonical).unwrap();
    assert_eq!(
        record::get_string(&written, record::KEY_LAST_KNOWN_NAME).unwrap(),
        PLAYER_NAME
    );
    assert_eq!(
        record::get_string_list(&written, record::KEY_WEBAPP_GROUP_IDS).unwrap(),
        group_ids()
    );

    let mut reloaded = state_for(tmp.path(), &web, &perms, USER_ID);
    let location = reloaded.load().unwrap();
    assert_eq!(location, RecordLocation::Canonical(canonical));
    assert!(!reloaded.is_new_file());
    assert_eq!(reloaded.last_known_name(), PLAYER_NAME);
    assert_eq!(reloaded, state);
}

#[test]
fn save_keeps_keys_it_does_not_own() {
    let tmp = tempdir().unwrap();
    let canonical = record::canonical_record_path(&players_dir(tmp.path()), &player_uuid());
    fs::create_dir_all(canonical.parent().unwrap()).unwrap();
    fs::write(
        &canonical,
        r#"
        notes = "met at spawn"
        [webapp]
        primary-group-id = "3"
        theme = "dark"
        "#,
    )
    .unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.load().unwrap();
    assert_eq!(state.webapp_primary_group_id(), "3");
    state.generate().unwrap();
    state.save().unwrap();

    let written = record::read_document(&canonical).unwrap();
    assert_eq!(record::get_string(&written, "notes").unwrap(), "met at spawn");
    assert_eq!(record::get_string(&written, "webapp.theme").unwrap(), "dark");
    assert_eq!(
        record::get_string(&written, record::KEY_WEBAPP_PRIMARY_GROUP_ID).unwrap(),
        PRIMARY_GROUP_ID
    );
}

#[test]
fn save_failure_is_persistence_failure_and_state_survives() {
    let tmp = tempdir().unwrap();
    // A plain file where the players directory should be.
    fs::write(players_dir(tmp.path()), "not a directory").unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.generate().unwrap();
    let before = state.copy();

    let err = state.save().unwrap_err();
    assert!(matches!(err, BridgeError::PersistenceFailure { .. }));
    assert!(err.is_retryable());
    assert_eq!(state, before);
    assert!(state.document().is_empty());
}

#[test]
fn legacy_record_is_read_and_next_save_goes_to_canonical() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    let legacy = record::legacy_record_path(&dir, PLAYER_NAME);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        &legacy,
        r#"
        last-known-name = "Zaffre"
        [webapp]
        primary-group-id = "10"
        group-ids = ["01", "02", "03"]
        [permissions-system]
        primary-group-name = "Builder"
        group-names = ["group1", "group2", "group3"]
        "#,
    )
    .unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    let location = state.load().unwrap();

    assert_eq!(location, RecordLocation::Legacy(legacy.clone()));
    assert!(!state.is_new_file());
    assert_eq!(state.webapp_primary_group_id(), PRIMARY_GROUP_ID);
    assert_eq!(state.permissions_system_group_names(), group_names().as_slice());

    state.save().unwrap();
    let canonical = record::canonical_record_path(&dir, &player_uuid());
    assert!(canonical.is_file());
    assert!(legacy.is_file());

    let mut again = state_for(tmp.path(), &web, &perms, USER_ID);
    assert_eq!(again.load().unwrap(), RecordLocation::Canonical(canonical));
    assert_eq!(again, state);
}

#[test]
fn canonical_record_wins_over_legacy() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        record::legacy_record_path(&dir, PLAYER_NAME),
        "[webapp]\nprimary-group-id = \"1\"\n",
    )
    .unwrap();
    fs::write(
        record::canonical_record_path(&dir, &player_uuid()),
        "[webapp]\nprimary-group-id = \"2\"\n",
    )
    .unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    let location = state.load().unwrap();

    assert!(matches!(location, RecordLocation::Canonical(_)));
    assert_eq!(state.webapp_primary_group_id(), "2");
}

#[test]
fn missing_keys_read_as_empty() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        record::canonical_record_path(&dir, &player_uuid()),
        "[webapp]\nprimary-group-id = 10\n",
    )
    .unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.load().unwrap();

    assert!(!state.is_new_file());
    assert_eq!(state.webapp_primary_group_id(), "10");
    assert!(state.webapp_group_ids().is_empty());
    assert_eq!(state.permissions_system_primary_group_name(), "");
    assert!(state.permissions_system_group_names().is_empty());
    assert_eq!(state.last_known_name(), "");
    assert!(!state.was_renamed());
}

#[test]
fn malformed_record_is_corrupt() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    let canonical = record::canonical_record_path(&dir, &player_uuid());
    fs::create_dir_all(&dir).unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));

    for content in [
        "this is = = not toml",
        "[webapp]\ngroup-ids = \"01\"\n",
        "[permissions-system]\nprimary-group-name = { nested = true }\n",
    ] {
        fs::write(&canonical, content).unwrap();
        let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
        state.set_webapp_primary_group_id("kept");
        match state.load() {
            Err(BridgeError::CorruptRecord { path, .. }) => assert_eq!(path, canonical),
            other => panic!("expected CorruptRecord for {:?}, got {:?}", content, other),
        }
        assert_eq!(state.webapp_primary_group_id(), "kept");
    }
}

#[test]
fn renamed_player_is_detected_from_record() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        record::canonical_record_path(&dir, &player_uuid()),
        "last-known-name = \"OldZaffre\"\n",
    )
    .unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    state.load().unwrap();
    assert_eq!(state.last_known_name(), "OldZaffre");
    assert!(state.was_renamed());

    state.save().unwrap();
    let mut again = state_for(tmp.path(), &web, &perms, USER_ID);
    again.load().unwrap();
    assert!(!again.was_renamed());
}

#[test]
fn environment_swap_is_seen_by_existing_states() {
    let tmp = tempdir().unwrap();
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);

    let other = Arc::new(FakeWebApplication::default());
    other
        .primary
        .lock()
        .unwrap()
        .insert(USER_ID.into(), "77".into());
    state.environment().set_web_application(other);

    state.generate().unwrap();
    assert_eq!(state.webapp_primary_group_id(), "77");
    assert!(state.webapp_group_ids().is_empty());

    let mut config = Config::default();
    config.resolve_paths(&tmp.path().join("elsewhere"));
    state.environment().set_configuration(config);
    let fresh = PlayerState::for_player(
        Arc::clone(state.environment()),
        Player::new(PLAYER_NAME, player_uuid()),
        USER_ID,
    );
    assert!(fresh.canonical_path().starts_with(tmp.path().join("elsewhere")));
}

#[test]
fn explicit_constructor_uses_given_paths_and_document() {
    let tmp = tempdir().unwrap();
    let canonical = tmp.path().join("by-uuid").join("zaffre.toml");
    let legacy = tmp.path().join("by-name").join("Zaffre.toml");
    fs::create_dir_all(legacy.parent().unwrap()).unwrap();
    fs::write(&legacy, "[webapp]\nprimary-group-id = \"5\"\n").unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let env = fakes::environment(tmp.path(), web, perms);
    let mut document = Table::new();
    document.insert("notes".into(), Value::String("kept".into()));

    let mut state = PlayerState::new(
        env,
        zaffre(),
        USER_ID,
        document,
        canonical.clone(),
        legacy.clone(),
    );
    assert_eq!(state.canonical_path(), canonical);
    assert_eq!(state.legacy_path(), legacy);
    assert_eq!(
        record::get_string(state.document(), "notes").unwrap(),
        "kept"
    );

    // Nothing under the configured players directory is consulted.
    assert_eq!(state.load().unwrap(), RecordLocation::Legacy(legacy.clone()));
    assert_eq!(state.webapp_primary_group_id(), "5");

    state.generate().unwrap();
    state.save().unwrap();
    assert!(canonical.is_file());
    assert!(!players_dir(tmp.path()).exists());
}

#[test]
fn injected_document_is_carried_into_first_save() {
    let tmp = tempdir().unwrap();
    let canonical = tmp.path().join("a").join("record.toml");
    let legacy = tmp.path().join("b").join("record.toml");
    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let env = fakes::environment(tmp.path(), web, perms);
    let mut document = Table::new();
    document.insert("notes".into(), Value::String("kept".into()));

    let mut state = PlayerState::new(env, zaffre(), USER_ID, document, canonical.clone(), legacy);
    assert_eq!(state.load().unwrap(), RecordLocation::Absent);
    state.generate().unwrap();
    state.save().unwrap();

    let written = record::read_document(&canonical).unwrap();
    assert_eq!(record::get_string(&written, "notes").unwrap(), "kept");
    assert_eq!(
        record::get_string(&written, record::KEY_PERMISSIONS_PRIMARY_GROUP_NAME).unwrap(),
        PRIMARY_GROUP_NAME
    );
}

#[test]
fn nameless_player_has_no_legacy_candidate() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(".toml"), "[webapp]\nprimary-group-id = \"9\"\n").unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let env = fakes::environment(tmp.path(), web, perms);
    let mut state = PlayerState::for_player(env, Player::new("", player_uuid()), "");

    assert!(state.legacy_path().as_os_str().is_empty());
    assert_eq!(state.load().unwrap(), RecordLocation::Absent);
    assert!(state.is_new_file());
    assert_eq!(state.webapp_primary_group_id(), "");
}

#[cfg(unix)]
#[test]
fn vanished_canonical_record_falls_back_to_legacy() {
    let tmp = tempdir().unwrap();
    let dir = players_dir(tmp.path());
    fs::create_dir_all(&dir).unwrap();
    let canonical = record::canonical_record_path(&dir, &player_uuid());
    std::os::unix::fs::symlink(dir.join("removed.toml"), &canonical).unwrap();
    fs::write(
        record::legacy_record_path(&dir, PLAYER_NAME),
        "[webapp]\nprimary-group-id = \"3\"\n",
    )
    .unwrap();

    let web = Arc::new(FakeWebApplication::zaffre());
    let perms = Arc::new(FakePermissions::zaffre(true));
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    assert!(matches!(state.load().unwrap(), RecordLocation::Legacy(_)));
    assert_eq!(state.webapp_primary_group_id(), "3");

    fs::remove_file(record::legacy_record_path(&dir, PLAYER_NAME)).unwrap();
    let mut state = state_for(tmp.path(), &web, &perms, USER_ID);
    assert_eq!(state.load().unwrap(), RecordLocation::Absent);
    assert!(state.is_new_file());
}
