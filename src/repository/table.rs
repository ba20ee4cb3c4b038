//! Database table operations and implementations.

use chrono::DateTime;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteArguments;

use crate::entity::EpisodeModel;
use crate::entity::NotificationModel;
use crate::entity::ShowModel;
use crate::entity::ShowStatus;
use crate::entity::UserModel;
use crate::repository::error::DatabaseError;

/// Base table struct providing database pool access.
#[derive(Clone)]
pub struct BaseTable {
    pub pool: SqlitePool,
}

impl BaseTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Base trait for table operations.
#[async_trait::async_trait]
pub trait TableBase {
    /// Creates the table and its indexes if they don't exist.
    async fn create_table(&self) -> Result<(), DatabaseError>;
    /// Drops the table.
    async fn drop_table(&self) -> Result<(), DatabaseError>;
    /// Deletes all rows from the table.
    async fn delete_all(&self) -> Result<(), DatabaseError>;
}

/// Trait for tables keyed by a single column.
#[async_trait::async_trait]
pub trait Table<T, ID>: TableBase {
    async fn select_all(&self) -> Result<Vec<T>, DatabaseError>;
    async fn insert(&self, model: &T) -> Result<ID, DatabaseError>;
    async fn select(&self, id: &ID) -> Result<Option<T>, DatabaseError>;
    async fn delete(&self, id: &ID) -> Result<(), DatabaseError>;
}

/// Binds a model field to either flavour of sqlx query.
pub trait BindParam<'q> {
    fn bind_param<O>(
        self,
        query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>,
    ) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>;
    fn bind_param_q(
        self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;
}

macro_rules! impl_bind_param {
    ($t:ty) => {
        impl<'q> BindParam<'q> for $t {
            fn bind_param<O>(
                self,
                query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>,
            ) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>> {
                query.bind(self)
            }
            fn bind_param_q(
                self,
                query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
            ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
                query.bind(self)
            }
        }
    };
}

impl_bind_param!(&'q i32);
impl_bind_param!(&'q i64);
impl_bind_param!(&'q String);
impl_bind_param!(&'q Option<String>);
impl_bind_param!(&'q ShowStatus);
impl_bind_param!(&'q DateTime<Utc>);
impl_bind_param!(&'q Option<DateTime<Utc>>);

/// Declares a table handle with its schema and [`TableBase`] operations.
macro_rules! impl_table_base {
    (
        $struct_name:ident,
        $table:expr,
        [ $( $create_sql:expr ),+ $(,)? ]
    ) => {
        #[derive(Clone)]
        pub struct $struct_name {
            base: BaseTable,
        }

        impl $struct_name {
            pub fn new(pool: SqlitePool) -> Self {
                Self {
                    base: BaseTable::new(pool),
                }
            }
        }

        #[async_trait::async_trait]
        impl TableBase for $struct_name {
            async fn create_table(&self) -> Result<(), DatabaseError> {
                for statement in [ $( $create_sql ),+ ] {
                    sqlx::query(statement).execute(&self.base.pool).await?;
                }
                Ok(())
            }

            async fn drop_table(&self) -> Result<(), DatabaseError> {
                sqlx::query(concat!("DROP TABLE IF EXISTS ", $table))
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }

            async fn delete_all(&self) -> Result<(), DatabaseError> {
                sqlx::query(concat!("DELETE FROM ", $table))
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }
        }
    };
}

/// Declares a table handle plus single-key CRUD through [`Table`].
macro_rules! impl_table {
    (
        $struct_name:ident,
        $model:ty,
        $table:expr,
        $pk:ident,
        $id_type:ty,
        [ $( $create_sql:expr ),+ $(,)? ],
        $cols:expr,
        $vals:expr,
        [ $( $field:ident ),+ ]
    ) => {
        impl_table_base!($struct_name, $table, [ $( $create_sql ),+ ]);

        #[async_trait::async_trait]
        impl Table<$model, $id_type> for $struct_name {
            async fn select_all(&self) -> Result<Vec<$model>, DatabaseError> {
                Ok(sqlx::query_as::<_, $model>(concat!("SELECT * FROM ", $table))
                    .fetch_all(&self.base.pool)
                    .await?)
            }

            async fn select(&self, id: &$id_type) -> Result<Option<$model>, DatabaseError> {
                let query = sqlx::query_as::<_, $model>(concat!(
                    "SELECT * FROM ", $table, " WHERE ", stringify!($pk), " = ?"
                ));
                let query = BindParam::bind_param(id, query);
                Ok(query.fetch_optional(&self.base.pool).await?)
            }

            async fn insert(&self, model: &$model) -> Result<$id_type, DatabaseError> {
                let mut query = sqlx::query_as::<_, ($id_type,)>(concat!(
                    "INSERT INTO ", $table, " (", $cols, ") VALUES (", $vals, ") RETURNING ", stringify!($pk)
                ));

                $(
                    query = BindParam::bind_param(&model.$field, query);
                )+

                let row = query.fetch_one(&self.base.pool).await?;
                Ok(row.0)
            }

            async fn delete(&self, id: &$id_type) -> Result<(), DatabaseError> {
                let query = sqlx::query(concat!(
                    "DELETE FROM ", $table, " WHERE ", stringify!($pk), " = ?"
                ));
                let query = BindParam::bind_param_q(id, query);
                query.execute(&self.base.pool).await?;
                Ok(())
            }
        }
    };
}

// ============================================================================
// ShowTable
// ============================================================================

impl_table!(
    ShowTable,
    ShowModel,
    "shows",
    id,
    String,
    [
        r#"CREATE TABLE IF NOT EXISTS shows (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            overview TEXT NOT NULL DEFAULT '',
            poster_url TEXT DEFAULT NULL,
            status TEXT NOT NULL DEFAULT 'unknown',
            first_air_date TIMESTAMP DEFAULT NULL,
            provider TEXT NOT NULL,
            provider_id TEXT NOT NULL,
            cross_ref_id TEXT DEFAULT NULL,
            UNIQUE(provider, provider_id)
        )"#,
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_shows_cross_ref_id
            ON shows(cross_ref_id) WHERE cross_ref_id IS NOT NULL"#,
    ],
    "id, name, overview, poster_url, status, first_air_date, provider, provider_id, cross_ref_id",
    "?, ?, ?, ?, ?, ?, ?, ?, ?",
    [
        id,
        name,
        overview,
        poster_url,
        status,
        first_air_date,
        provider,
        provider_id,
        cross_ref_id
    ]
);

impl ShowTable {
    pub async fn select_by_cross_ref(
        &self,
        cross_ref_id: &str,
    ) -> Result<Option<ShowModel>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, ShowModel>("SELECT * FROM shows WHERE cross_ref_id = ? LIMIT 1")
                .bind(cross_ref_id)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    pub async fn select_by_provenance(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<ShowModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, ShowModel>(
            "SELECT * FROM shows WHERE provider = ? AND provider_id = ?",
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    /// Finds the show a record merges into by cross-reference ID.
    ///
    /// Returns `None` when the model carries no cross-reference or no stored show has it.
    /// Stored fields are left untouched.
    pub async fn upsert_by_cross_ref(
        &self,
        model: &ShowModel,
    ) -> Result<Option<ShowModel>, DatabaseError> {
        match &model.cross_ref_id {
            Some(cross_ref_id) => self.select_by_cross_ref(cross_ref_id).await,
            None => Ok(None),
        }
    }

    /// Returns the show stored for the model's provenance, inserting it first if absent.
    ///
    /// An existing show lacking a cross-reference gets the model's one, unless another
    /// show already owns that value. Nothing else on an existing row is overwritten.
    ///
    /// # Performance
    ///
    /// 1-4 queries. Concurrent callers racing on the same provenance or cross-reference
    /// both end up with the single winning row.
    pub async fn upsert_by_provenance(&self, model: &ShowModel) -> Result<ShowModel, DatabaseError> {
        if let Some(existing) = self
            .select_by_provenance(&model.provider, &model.provider_id)
            .await?
        {
            if let Some(cross_ref_id) = &model.cross_ref_id
                && existing.cross_ref_id.is_none()
                && self.backfill_cross_ref(&existing.id, cross_ref_id).await?
            {
                return self.select(&existing.id).await?.ok_or_else(|| {
                    DatabaseError::InternalError {
                        message: format!("show {} vanished during backfill", existing.id),
                    }
                });
            }
            return Ok(existing);
        }

        sqlx::query(
            r#"INSERT INTO shows
                (id, name, overview, poster_url, status, first_air_date, provider, provider_id, cross_ref_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING"#,
        )
        .bind(&model.id)
        .bind(&model.name)
        .bind(&model.overview)
        .bind(&model.poster_url)
        .bind(model.status)
        .bind(model.first_air_date)
        .bind(&model.provider)
        .bind(&model.provider_id)
        .bind(&model.cross_ref_id)
        .execute(&self.base.pool)
        .await?;

        // Whichever writer won either uniqueness constraint owns the row now.
        if let Some(show) = self
            .select_by_provenance(&model.provider, &model.provider_id)
            .await?
        {
            return Ok(show);
        }
        if let Some(cross_ref_id) = &model.cross_ref_id
            && let Some(show) = self.select_by_cross_ref(cross_ref_id).await?
        {
            return Ok(show);
        }
        Err(DatabaseError::InternalError {
            message: format!(
                "show {}:{} was neither inserted nor found",
                model.provider, model.provider_id
            ),
        })
    }

    /// Sets the cross-reference of a show that has none. Set-once.
    pub async fn backfill_cross_ref(
        &self,
        show_id: &str,
        cross_ref_id: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"UPDATE shows SET cross_ref_id = ?
            WHERE id = ?
                AND cross_ref_id IS NULL
                AND NOT EXISTS (SELECT 1 FROM shows WHERE cross_ref_id = ?)"#,
        )
        .bind(cross_ref_id)
        .bind(show_id)
        .bind(cross_ref_id)
        .execute(&self.base.pool)
        .await;

        match result {
            Ok(res) => Ok(res.rows_affected() > 0),
            Err(e) => {
                let err = DatabaseError::from(e);
                if err.is_unique_violation() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }
}

// ============================================================================
// EpisodeTable
// ============================================================================

impl_table!(
    EpisodeTable,
    EpisodeModel,
    "episodes",
    id,
    String,
    [
        r#"CREATE TABLE IF NOT EXISTS episodes (
            id TEXT PRIMARY KEY,
            show_id TEXT NOT NULL,
            name TEXT NOT NULL,
            season_number INTEGER NOT NULL DEFAULT 0,
            episode_number INTEGER NOT NULL DEFAULT 0,
            air_date TIMESTAMP DEFAULT NULL,
            overview TEXT NOT NULL DEFAULT '',
            provider TEXT NOT NULL,
            provider_id TEXT NOT NULL,
            UNIQUE(provider, provider_id),
            FOREIGN KEY (show_id) REFERENCES shows(id) ON DELETE CASCADE ON UPDATE CASCADE
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_episodes_show_air_date
            ON episodes(show_id, air_date)"#,
    ],
    "id, show_id, name, season_number, episode_number, air_date, overview, provider, provider_id",
    "?, ?, ?, ?, ?, ?, ?, ?, ?",
    [
        id,
        show_id,
        name,
        season_number,
        episode_number,
        air_date,
        overview,
        provider,
        provider_id
    ]
);

impl EpisodeTable {
    /// Inserts the episode unless its provenance is already stored.
    ///
    /// Returns `true` when a new row was written.
    pub async fn upsert_by_provenance(&self, model: &EpisodeModel) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"INSERT INTO episodes
                (id, show_id, name, season_number, episode_number, air_date, overview, provider, provider_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING"#,
        )
        .bind(&model.id)
        .bind(&model.show_id)
        .bind(&model.name)
        .bind(model.season_number)
        .bind(model.episode_number)
        .bind(model.air_date)
        .bind(&model.overview)
        .bind(&model.provider)
        .bind(&model.provider_id)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn select_all_by_show_id(
        &self,
        show_id: &str,
    ) -> Result<Vec<EpisodeModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, EpisodeModel>(
            r#"SELECT * FROM episodes
            WHERE show_id = ?
            ORDER BY season_number, episode_number"#,
        )
        .bind(show_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Earliest episode of the show airing strictly after `now`.
    pub async fn select_next_upcoming(
        &self,
        show_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EpisodeModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, EpisodeModel>(
            r#"SELECT * FROM episodes
            WHERE show_id = ? AND air_date IS NOT NULL AND air_date > ?
            ORDER BY air_date, season_number, episode_number
            LIMIT 1"#,
        )
        .bind(show_id)
        .bind(now)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    /// Episodes of the show with `from < air_date < until`, both bounds exclusive.
    pub async fn select_airing_between(
        &self,
        show_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<EpisodeModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, EpisodeModel>(
            r#"SELECT * FROM episodes
            WHERE show_id = ? AND air_date IS NOT NULL AND air_date > ? AND air_date < ?
            ORDER BY air_date, season_number, episode_number"#,
        )
        .bind(show_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Episodes of every show the user follows with `from < air_date < until`.
    pub async fn select_upcoming_by_user_id(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<EpisodeModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, EpisodeModel>(
            r#"SELECT e.* FROM episodes e
            JOIN user_shows us ON us.show_id = e.show_id
            WHERE us.user_id = ?
                AND e.air_date IS NOT NULL AND e.air_date > ? AND e.air_date < ?
            ORDER BY e.air_date, e.season_number, e.episode_number"#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.base.pool)
        .await?)
    }
}

// ============================================================================
// UserTable
// ============================================================================

impl_table!(
    UserTable,
    UserModel,
    "users",
    id,
    i64,
    [r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL DEFAULT '',
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT ''
    )"#],
    "id, username, first_name, last_name",
    "?, ?, ?, ?",
    [id, username, first_name, last_name]
);

impl UserTable {
    /// Inserts the user or refreshes their display fields.
    pub async fn upsert(&self, model: &UserModel) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"INSERT INTO users (id, username, first_name, last_name)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name"#,
        )
        .bind(model.id)
        .bind(&model.username)
        .bind(&model.first_name)
        .bind(&model.last_name)
        .execute(&self.base.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// SubscriptionTable
// ============================================================================

impl_table_base!(
    SubscriptionTable,
    "user_shows",
    [
        r#"CREATE TABLE IF NOT EXISTS user_shows (
            user_id INTEGER NOT NULL,
            show_id TEXT NOT NULL,
            PRIMARY KEY (user_id, show_id),
            FOREIGN KEY (show_id) REFERENCES shows(id) ON DELETE CASCADE ON UPDATE CASCADE
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_user_shows_show_id ON user_shows(show_id)"#,
    ]
);

impl SubscriptionTable {
    /// Returns `true` if the follow edge was created, `false` if it already existed.
    pub async fn follow(&self, user_id: i64, show_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO user_shows (user_id, show_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(show_id)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if a follow edge was removed.
    pub async fn unfollow(&self, user_id: i64, show_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM user_shows WHERE user_id = ? AND show_id = ?")
            .bind(user_id)
            .bind(show_id)
            .execute(&self.base.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user_id: i64, show_id: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM user_shows WHERE user_id = ? AND show_id = ?)",
        )
        .bind(user_id)
        .bind(show_id)
        .fetch_one(&self.base.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn count_by_user_id(&self, user_id: i64) -> Result<u32, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_shows WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.base.pool)
            .await?;
        Ok(row.0 as u32)
    }

    /// Shows followed by the user, ordered by name.
    pub async fn select_shows_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Vec<ShowModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, ShowModel>(
            r#"SELECT s.* FROM shows s
            JOIN user_shows us ON us.show_id = s.id
            WHERE us.user_id = ?
            ORDER BY s.name"#,
        )
        .bind(user_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Every show with at least one follower.
    pub async fn select_all_followed_shows(&self) -> Result<Vec<ShowModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, ShowModel>(
            r#"SELECT * FROM shows
            WHERE id IN (SELECT DISTINCT show_id FROM user_shows)
            ORDER BY id"#,
        )
        .fetch_all(&self.base.pool)
        .await?)
    }
}

// ============================================================================
// NotificationTable
// ============================================================================

impl_table!(
    NotificationTable,
    NotificationModel,
    "notifications",
    id,
    i64,
    [
        r#"CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            episode_id TEXT NOT NULL,
            notified_at TIMESTAMP NOT NULL,
            UNIQUE(user_id, episode_id),
            FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE ON UPDATE CASCADE
        )"#,
    ],
    "user_id, episode_id, notified_at",
    "?, ?, ?",
    [user_id, episode_id, notified_at]
);

impl NotificationTable {
    /// Followers of `show_id` with no notification recorded for `episode_id`.
    pub async fn select_users_to_notify(
        &self,
        episode_id: &str,
        show_id: &str,
    ) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"SELECT us.user_id FROM user_shows us
            LEFT JOIN notifications n ON n.user_id = us.user_id AND n.episode_id = ?
            WHERE us.show_id = ? AND n.id IS NULL
            ORDER BY us.user_id"#,
        )
        .bind(episode_id)
        .bind(show_id)
        .fetch_all(&self.base.pool)
        .await?;
        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    /// Records a notification.
    ///
    /// Returns `false` when one was already recorded for the pair; the UNIQUE
    /// constraint decides which of two concurrent writers wins.
    pub async fn record(
        &self,
        user_id: i64,
        episode_id: &str,
        notified_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let model = NotificationModel {
            id: 0,
            user_id,
            episode_id: episode_id.to_string(),
            notified_at,
        };
        match self.insert(&model).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, user_id: i64, episode_id: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM notifications WHERE user_id = ? AND episode_id = ?)",
        )
        .bind(user_id)
        .bind(episode_id)
        .fetch_one(&self.base.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn count_by_episode_id(&self, episode_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE episode_id = ?")
            .bind(episode_id)
            .fetch_one(&self.base.pool)
            .await?;
        Ok(row.0)
    }
}
