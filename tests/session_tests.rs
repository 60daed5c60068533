use multisql::config::AppPreferences;
use multisql::models::enums::{CredentialMode, ResultDisplayType};
use multisql::session::SessionList;

fn dbs(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn sql_cred() -> CredentialMode {
    CredentialMode::SqlServer {
        user: "sa".to_string(),
        password: "pw".to_string(),
    }
}

#[test]
fn target_ids_are_unique_across_servers_and_reconnects() {
    let mut sessions = SessionList::new();
    sessions.add_server("srvA", sql_cred(), dbs(&["db1", "db2"]));
    sessions.add_server("srvB", CredentialMode::Integrated, dbs(&["db1"]));

    let mut ids: Vec<i64> = sessions.targets().map(|t| t.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);

    // Reconnecting replaces the server's targets with fresh ids.
    sessions.add_server("SRVA", sql_cred(), dbs(&["db1"]));
    assert_eq!(sessions.servers().len(), 2);
    let ids: Vec<i64> = sessions.targets().map(|t| t.id).collect();
    assert!(ids.contains(&4));
    assert!(!ids.contains(&1));
}

#[test]
fn list_is_empty_until_a_server_connects() {
    let mut sessions = SessionList::new();
    assert!(sessions.is_empty());
    sessions.add_server("srv", sql_cred(), dbs(&["db1"]));
    assert!(!sessions.is_empty());
    sessions.remove_server("srv");
    assert!(sessions.is_empty());
}

#[test]
fn credential_lookup_ignores_server_case() {
    let mut sessions = SessionList::new();
    sessions.add_server("SrvA", CredentialMode::Integrated, dbs(&["db1"]));
    assert!(sessions.credential_for("srva").is_some());
    assert!(sessions.credential_for("other").is_none());
}

#[test]
fn checked_targets_come_out_sorted_by_server_then_database() {
    let mut sessions = SessionList::new();
    sessions.add_server("zeta", sql_cred(), dbs(&["mdb", "adb"]));
    sessions.add_server("alpha", sql_cred(), dbs(&["zdb"]));
    sessions.set_all_checked(true, "");

    let order: Vec<String> = sessions
        .checked_targets()
        .iter()
        .map(|t| format!("{}/{}", t.server, t.database))
        .collect();
    assert_eq!(order, vec!["alpha/zdb", "zeta/adb", "zeta/mdb"]);
}

#[test]
fn select_all_honours_the_filter() {
    let mut sessions = SessionList::new();
    sessions.add_server("srv", sql_cred(), dbs(&["Sales", "sales_archive", "HR"]));

    sessions.set_all_checked(true, "sales");
    assert_eq!(sessions.selected_count_text(), "Selected 2 of 3");

    // Clearing with a filter leaves the hidden rows alone.
    sessions.set_all_checked(true, "");
    sessions.set_all_checked(false, "HR");
    assert_eq!(sessions.selected_count_text(), "Selected 2 of 3");
}

#[test]
fn filter_matches_server_names_too() {
    let mut sessions = SessionList::new();
    sessions.add_server("prod-01", sql_cred(), dbs(&["db1"]));
    let target = sessions.targets().next().unwrap().clone();
    assert!(SessionList::matches_filter(&target, "PROD"));
    assert!(SessionList::matches_filter(&target, "db1"));
    assert!(!SessionList::matches_filter(&target, "staging"));
}

#[test]
fn selection_round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selection.txt");

    let mut sessions = SessionList::new();
    sessions.add_server("srv", sql_cred(), dbs(&["db1", "db2", "db3"]));
    let first_id = sessions.targets().next().unwrap().id;
    sessions.set_checked(first_id, true);
    sessions.save_selection(&path).unwrap();

    // A fresh session with one extra unknown db in the file.
    let mut restored = SessionList::new();
    restored.add_server("SRV", sql_cred(), dbs(&["db1", "db2"]));
    let applied = restored.load_selection(&path).unwrap();
    assert_eq!(applied, 1);
    assert_eq!(restored.checked_targets().len(), 1);
    assert_eq!(restored.checked_targets()[0].database, "db1");
}

#[test]
fn preferences_round_trip_and_timeout_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preferences.json");

    let mut prefs = AppPreferences::default();
    prefs.result_display_type = ResultDisplayType::CombinedFile;
    prefs.delimiter = ";".to_string();
    prefs.connection_timeout_secs = 0;
    prefs.run_in_sequence = true;
    prefs.save_to(&path).unwrap();

    let loaded = AppPreferences::load_from(&path);
    assert_eq!(loaded.result_display_type, ResultDisplayType::CombinedFile);
    assert_eq!(loaded.delimiter, ";");
    assert!(loaded.run_in_sequence);
    assert_eq!(loaded.effective_timeout_secs(), 30);

    // A missing file is just defaults.
    let missing = AppPreferences::load_from(&dir.path().join("nope.json"));
    assert_eq!(missing.result_display_type, ResultDisplayType::Text);
}
