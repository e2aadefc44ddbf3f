use std::fs;

use lib_pubsub::setup_logging;

#[test]
fn log_records_land_in_a_fresh_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pubsub_2000-01-01_00-00-00.log"), "old").unwrap();
    fs::write(dir.path().join("pubsub_2000-01-02_00-00-00.log"), "older").unwrap();

    let path = setup_logging("pubsub", dir.path(), "debug").unwrap();
    log::info!("session engine starting");
    log::trace!("filtered out");
    log::logger().flush();

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[INFO] session engine starting"), "{}", contents);
    assert!(!contents.contains("filtered out"));

    let logs = fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().map_or(false, |ext| ext == "log"))
        .count();
    assert_eq!(logs, 2);
}
