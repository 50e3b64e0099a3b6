use chrono::{Duration, TimeZone, Utc};
use labpoll_store::{connect, create_devices_table, MeasurementSink, StoreError, StoreWriter};
use labpoll_types::{DeviceAddress, ExampleReading, Measurement, SmartProReading};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use std::sync::Arc;

async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = connect("sqlite::memory:", 1).await.unwrap();
    create_devices_table(&db).await.unwrap();
    Arc::new(db)
}

async fn insert_device(db: &DatabaseConnection, addr: &DeviceAddress, device_type: &str) {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        format!(
            "INSERT INTO devices (ip_address, port, label, device_type) VALUES ('{}', {}, NULL, '{}')",
            addr.ip, addr.port, device_type
        ),
    ))
    .await
    .unwrap();
}

async fn count_rows(db: &DatabaseConnection, table: &str) -> i64 {
    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            format!("SELECT COUNT(*) AS n FROM {}", table),
        ))
        .await
        .unwrap()
        .unwrap();
    row.try_get("", "n").unwrap()
}

fn addr(port: u16) -> DeviceAddress {
    DeviceAddress::new("127.0.0.1".parse().unwrap(), port)
}

#[tokio::test]
async fn test_round_trip_preserves_fields() {
    let db = create_test_db().await;
    let device = addr(56000);
    insert_device(&db, &device, "SmartProDevice").await;

    let writer = StoreWriter::<SmartProReading>::new(db.clone()).unwrap();
    writer.ensure_table().await.unwrap();

    let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::milliseconds(250);
    let batch = vec![
        Measurement::success(base, SmartProReading::new(true, 2150)),
        Measurement::device_fault(base + Duration::seconds(1), SmartProReading::new(false, 0)),
        Measurement::network_failure(base + Duration::seconds(2)),
    ];

    let report = writer.write_batch(&device, &batch).await.unwrap();
    assert_eq!(report.written, 3);
    assert_eq!(report.failed, 0);

    let read = writer
        .read_range(&device, base, base + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(read, batch);

    // 区间外的记录不返回
    let later = writer
        .read_range(&device, base + Duration::seconds(1), base + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(later, vec![batch[1].clone()]);
}

#[tokio::test]
async fn test_row_failure_does_not_abort_batch() {
    let db = create_test_db().await;
    let device = addr(56000);
    insert_device(&db, &device, "ExampleDevice").await;

    let writer = StoreWriter::<ExampleReading>::new(db.clone()).unwrap();
    writer.ensure_table().await.unwrap();

    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let reading = ExampleReading {
        altitude: 100,
        speed: 12,
        distance_travelled: 3,
    };
    // 第二条与第一条主键冲突
    let batch = vec![
        Measurement::success(ts, reading.clone()),
        Measurement::success(ts, reading.clone()),
        Measurement::success(ts + Duration::seconds(1), reading.clone()),
    ];

    let report = writer.write_batch(&device, &batch).await.unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(count_rows(&db, "example_measurements").await, 2);
}

#[tokio::test]
async fn test_unknown_device_rows_fail_individually() {
    let db = create_test_db().await;
    let writer = StoreWriter::<SmartProReading>::new(db.clone()).unwrap();
    writer.ensure_table().await.unwrap();

    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let batch = vec![Measurement::success(ts, SmartProReading::new(true, 100))];

    let report = writer.write_batch(&addr(9), &batch).await.unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let db = create_test_db().await;
    let writer = StoreWriter::<SmartProReading>::new(db.clone()).unwrap();
    writer.ensure_table().await.unwrap();

    let report = writer.write_batch(&addr(1), &[]).await.unwrap();
    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn test_device_delete_cascades_measurements() {
    let db = create_test_db().await;
    let device = addr(56000);
    insert_device(&db, &device, "SmartProDevice").await;

    let writer = StoreWriter::<SmartProReading>::new(db.clone()).unwrap();
    writer.ensure_table().await.unwrap();

    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let batch = vec![
        Measurement::success(ts, SmartProReading::new(true, 100)),
        Measurement::success(ts + Duration::seconds(1), SmartProReading::new(true, 101)),
    ];
    writer.write_batch(&device, &batch).await.unwrap();
    assert_eq!(count_rows(&db, "smart_pro_measurements").await, 2);

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DELETE FROM devices WHERE ip_address = '127.0.0.1' AND port = 56000".to_string(),
    ))
    .await
    .unwrap();

    assert_eq!(count_rows(&db, "smart_pro_measurements").await, 0);
}

#[tokio::test]
async fn test_missing_table_is_database_error() {
    let db = create_test_db().await;
    let writer = StoreWriter::<SmartProReading>::new(db.clone()).unwrap();

    let now = Utc::now();
    let result = writer.read_range(&addr(1), now, now).await;
    assert!(matches!(result, Err(StoreError::Database(_))));
}
