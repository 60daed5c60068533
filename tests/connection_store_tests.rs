use chrono::Utc;
use multisql::connection::ConnectionStore;
use std::fs;

fn store_in(dir: &tempfile::TempDir) -> ConnectionStore {
    ConnectionStore::new(dir.path().join("connections.xml"))
}

#[test]
fn missing_file_is_created_empty_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    assert!(store.load().is_empty());
    let content = fs::read_to_string(store.path()).unwrap();
    assert!(content.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    assert!(content.contains("Connections"));
}

#[test]
fn saved_connection_round_trips_with_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let before = Utc::now();

    store.save("myserver,1533", "sa", false).unwrap();

    let content = fs::read_to_string(store.path()).unwrap();
    assert!(content.contains("Server=\"myserver,1533\""));
    assert!(content.contains("UserName=\"sa\""));
    assert!(content.contains("IntegratedSecurity=\"false\""));
    assert!(content.contains("LastUsed="));

    let loaded = store.load();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].server, "myserver,1533");
    assert_eq!(loaded[0].user_name, "sa");
    assert!(!loaded[0].integrated_security);
    assert!(loaded[0].last_used >= before);
}

#[test]
fn reconnect_updates_last_used_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.save("srv", "sa", false).unwrap();
    let first = store.load()[0].last_used;

    // Same endpoint differing only in case.
    store.save("SRV", "SA", false).unwrap();
    let loaded = store.load();
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].last_used >= first);

    // Same server via integrated security is a different endpoint.
    store.save("srv", "", true).unwrap();
    assert_eq!(store.load().len(), 2);
}

#[test]
fn connections_come_back_most_recent_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.save("old", "sa", false).unwrap();
    store.save("middle", "sa", false).unwrap();
    store.save("newest", "sa", false).unwrap();
    // Re-using the oldest bumps it to the front.
    store.save("old", "sa", false).unwrap();

    let servers: Vec<String> = store.load().into_iter().map(|c| c.server).collect();
    assert_eq!(servers[0], "old");
    assert_eq!(servers.len(), 3);
}

#[test]
fn corrupt_file_loads_as_empty_and_recovers_on_save() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    fs::write(store.path(), "<Connections><Connec").unwrap();

    assert!(store.load().is_empty());

    store.save("srv", "sa", false).unwrap();
    assert_eq!(store.load().len(), 1);
}

#[test]
fn unparseable_last_used_falls_back_to_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    fs::write(
        store.path(),
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Connections>\n  \
         <Connection Server=\"srv\" UserName=\"sa\" IntegratedSecurity=\"false\" \
         LastUsed=\"not-a-date\"/>\n</Connections>",
    )
    .unwrap();

    let loaded = store.load();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].last_used, chrono::DateTime::UNIX_EPOCH);
}
