//! Database module with SQLite storage and SQLx.

use std::str::FromStr;

use log::debug;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::repository::table::EpisodeTable;
use crate::repository::table::NotificationTable;
use crate::repository::table::ShowTable;
use crate::repository::table::SubscriptionTable;
use crate::repository::table::TableBase;
use crate::repository::table::UserTable;

pub mod error;
pub mod table;

/// Main database struct containing all table handlers.
pub struct Repository {
    pool: SqlitePool,
    pub show: ShowTable,
    pub episode: EpisodeTable,
    pub user: UserTable,
    pub subscription: SubscriptionTable,
    pub notification: NotificationTable,
}

impl Repository {
    /// Creates a new database connection and initializes table handlers.
    pub async fn new(db_url: &str, db_path: &str) -> anyhow::Result<Self> {
        let path = std::path::Path::new(db_path);
        if !path.exists() {
            debug!("Database path {db_path} does not exist. Creating...");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, "")?;
            info!("Created {db_path}");
        }

        debug!("Connecting to db...");
        let opts = SqliteConnectOptions::from_str(db_url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(opts).await?;
        info!("Connected to db.");

        Ok(Self {
            show: ShowTable::new(pool.clone()),
            episode: EpisodeTable::new(pool.clone()),
            user: UserTable::new(pool.clone()),
            subscription: SubscriptionTable::new(pool.clone()),
            notification: NotificationTable::new(pool.clone()),
            pool,
        })
    }

    /// Creates every table and index that does not exist yet.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        self.show.create_table().await?;
        self.episode.create_table().await?;
        self.user.create_table().await?;
        self.subscription.create_table().await?;
        self.notification.create_table().await?;
        Ok(())
    }

    /// Drops all tables. Use with caution!
    pub async fn drop_all_tables(&self) -> anyhow::Result<()> {
        self.notification.drop_table().await?;
        self.subscription.drop_table().await?;
        self.user.drop_table().await?;
        self.episode.drop_table().await?;
        self.show.drop_table().await?;
        Ok(())
    }

    /// Deletes all data from all tables. Use with caution!
    pub async fn delete_all_tables(&self) -> anyhow::Result<()> {
        self.notification.delete_all().await?;
        self.subscription.delete_all().await?;
        self.user.delete_all().await?;
        self.episode.delete_all().await?;
        self.show.delete_all().await?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
