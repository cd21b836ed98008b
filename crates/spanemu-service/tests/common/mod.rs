//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use spanemu_core::config::OperationMode;
use spanemu_core::{DatabaseName, InstanceName, SequentialNames};
use spanemu_service::{DatabaseClient, Emulator, InstanceInfo};
use spanemu_storage::Mutation;

pub const PROJECT: &str = "test-project";
pub const INSTANCE: &str = "test-instance";
pub const DATABASE: &str = "test-database";

const NUM_NAMES: [&str; 20] = [
    "", " one", " two", " three", " four", " five", " six", " seven", " eight", " nine", " ten",
    " eleven", " twelve", " thirteen", " fourteen", " fifteen", " sixteen", " seventeen",
    " eighteen", " nineteen",
];

const TENS_NAMES: [&str; 10] = [
    "", " ten", " twenty", " thirty", " forty", " fifty", " sixty", " seventy", " eighty",
    " ninety",
];

/// English words for 0..=999, e.g. `51` → `"fifty one"`.
pub fn words(number: i64) -> String {
    if number == 0 {
        return "zero".to_string();
    }
    let mut n = number as usize;
    let mut so_far = if n % 100 < 20 {
        let s = NUM_NAMES[n % 100].to_string();
        n /= 100;
        s
    } else {
        let mut s = NUM_NAMES[n % 10].to_string();
        n /= 10;
        s = format!("{}{s}", TENS_NAMES[n % 10]);
        n /= 10;
        s
    };
    if n > 0 {
        so_far = format!("{} hundred{so_far}", NUM_NAMES[n]);
    }
    so_far.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn instance_name() -> InstanceName {
    InstanceName::new(PROJECT, INSTANCE)
}

pub fn database_name() -> DatabaseName {
    instance_name().database(DATABASE)
}

/// Emulator with deterministic operation ids and one empty database.
pub async fn emulator_with_database(mode: OperationMode) -> Emulator {
    let emulator = Emulator::with_names(mode, Arc::new(SequentialNames::new()));
    emulator
        .create_instance(
            InstanceInfo::new(instance_name(), "regional-europe-west1")
                .with_display_name("Test Instance"),
        )
        .expect("create instance")
        .wait()
        .await
        .expect("instance ready");
    emulator
        .create_database(database_name(), &[])
        .expect("create database")
        .wait()
        .await
        .expect("database ready");
    emulator
}

pub async fn execute_ddl(emulator: &Emulator, statements: &[&str]) {
    let statements: Vec<String> = statements.iter().map(|s| s.to_string()).collect();
    let op = emulator
        .update_database_ddl(&database_name(), &statements)
        .expect("ddl accepted");
    op.wait().await.expect("ddl applied");
    assert!(op.is_done());
    assert!(op.is_successful());
}

pub async fn create_number_table(emulator: &Emulator) {
    execute_ddl(
        emulator,
        &["create table number (number int64 not null, name string(100) not null) primary key (number)"],
    )
    .await;
}

pub async fn create_index_on_number_name(emulator: &Emulator) {
    execute_ddl(emulator, &["create index idx_number_name on number (name)"]).await;
}

/// Insert `1..=rows` with their word forms in one transaction.
pub fn insert_test_numbers(client: &DatabaseClient, rows: i64) {
    client
        .read_write_transaction(|tx| {
            for n in 1..=rows {
                tx.buffer(
                    Mutation::insert("number")
                        .set("number", n)
                        .set("name", words(n))
                        .build(),
                );
            }
            Ok(())
        })
        .expect("insert numbers");
}
