//! Transaction guard for automatic rollback on drop
//!
//! This module provides RAII-style transaction management over a [`Connection`].

use super::connection::Connection;
use super::error::{DatabaseError, Result};

/// Transaction guard that automatically rolls back on drop if not finished
///
/// If the guard is dropped without calling `commit()` or `rollback()`, the
/// transaction is rolled back, so an early return or a panic never leaks an open
/// transaction.
///
/// # Example
///
/// ```ignore
/// use rust_db_migrator::TransactionGuard;
///
/// fn transfer(conn: &Connection) -> Result<()> {
///     let tx = TransactionGuard::begin(conn)?;
///
///     conn.statement("UPDATE accounts SET balance = balance - 100 WHERE id = ?", &[1.into()])?;
///     conn.statement("UPDATE accounts SET balance = balance + 100 WHERE id = ?", &[2.into()])?;
///
///     tx.commit()
/// }
/// ```
pub struct TransactionGuard<'a> {
    connection: &'a Connection,
    finished: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a new transaction
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection is invalid or not open
    /// - The driver doesn't support transactions
    /// - The driver refused to begin one
    pub fn begin(connection: &'a Connection) -> Result<Self> {
        if !connection.transaction() {
            return Err(DatabaseError::transaction(format!(
                "Unable to begin transaction on '{}': {}",
                connection.connection_name(),
                connection.last_error()
            )));
        }

        Ok(Self {
            connection,
            finished: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.connection
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails, the guard then still rolls back on drop
    pub fn commit(mut self) -> Result<()> {
        if !self.connection.commit() {
            return Err(DatabaseError::transaction(format!(
                "Unable to commit transaction: {}",
                self.connection.last_error()
            )));
        }

        self.finished = true;
        Ok(())
    }

    /// Explicitly roll the transaction back
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;

        if !self.connection.rollback() {
            return Err(DatabaseError::transaction(format!(
                "Unable to roll back transaction: {}",
                self.connection.last_error()
            )));
        }

        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        log::warn!(
            "TransactionGuard on '{}' dropped without commit or rollback, rolling back",
            self.connection.connection_name()
        );
        if !self.connection.rollback() {
            log::error!(
                "TransactionGuard auto-rollback failed: {}",
                self.connection.last_error()
            );
        }
    }
}
