//! Migrator example
//!
//! This example demonstrates the migration workflow including:
//! - Installing the migrations table
//! - Running pending migrations in one batch or step by step
//! - Pretending, rolling back and resetting
//!
//! Run with: cargo run --example migrate

use rust_db_migrator::prelude::*;
use std::sync::Arc;

fn migrations() -> Vec<Arc<dyn Migration>> {
    vec![
        Arc::new(SqlMigration::new(
            "_2024_01_01_000000_create_users_table",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "DROP TABLE users",
        )),
        Arc::new(
            SqlMigration::new(
                "_2024_01_02_000000_create_posts_table",
                "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, title TEXT)",
                "DROP TABLE posts",
            )
            .and_up("CREATE INDEX posts_user_id ON posts (user_id)"),
        ),
        Arc::new(SqlMigration::new(
            "_2024_02_01_120000_add_email_to_users",
            "ALTER TABLE users ADD COLUMN email TEXT",
            "ALTER TABLE users DROP COLUMN email",
        )),
    ]
}

fn print_status(migrator: &Migrator) -> Result<()> {
    if let Some(rows) = migrator.status()? {
        for row in rows {
            match row.status {
                MigrationStatus::Applied { batch } => println!("   [{}] {}", batch, row.name),
                MigrationStatus::Pending => println!("   [ ] {}", row.name),
            }
        }
    }
    println!();
    Ok(())
}

fn print_notes(migrator: &Migrator) {
    for note in migrator.take_notes() {
        println!("   {}", note);
    }
}

fn main() -> Result<()> {
    println!("=== Rust DB Migrator - Migration Example ===\n");

    let registry = Arc::new(ConnectionRegistry::new());
    registry.add_database("sqlite", DEFAULT_CONNECTION)?;

    let repository = MigrationRepository::new(Arc::clone(&registry));
    let migrator = Migrator::new(repository, Arc::clone(&registry), migrations())?;

    println!("1. Installing the migrations table...");
    migrator.install()?;
    print_notes(&migrator);
    println!();

    println!("2. Pretending to run...");
    migrator.run(MigrateOptions::pretend())?;
    print_notes(&migrator);
    println!();

    println!("3. Running step by step...");
    migrator.run(MigrateOptions::step())?;
    print_notes(&migrator);
    print_status(&migrator)?;

    println!("4. Rolling back the last two migrations...");
    migrator.rollback(MigrateOptions::steps(2))?;
    print_notes(&migrator);
    print_status(&migrator)?;

    println!("5. Running the rest in one batch...");
    migrator.run(MigrateOptions::default())?;
    print_notes(&migrator);
    print_status(&migrator)?;

    println!("6. Redoing the latest migration...");
    migrator.refresh(MigrateOptions::steps(1))?;
    print_notes(&migrator);
    print_status(&migrator)?;

    println!("7. Starting from an empty database...");
    migrator.fresh(false)?;
    print_notes(&migrator);
    print_status(&migrator)?;

    println!("8. Resetting...");
    migrator.reset(false)?;
    print_notes(&migrator);
    print_status(&migrator)?;

    println!("=== Example completed successfully ===");
    Ok(())
}
