//! Database service for budget-service.
//!
//! Every query takes the owning `user_id` and filters on it; rows belonging to another
//! user are indistinguishable from missing rows.

use crate::models::category::DEFAULT_CATEGORIES;
use crate::models::{Budget, BudgetInput, BudgetWrite, Category, Entry, EntryInput, User};
use crate::services::filters::{clamp_page_size, like_pattern, EntryFilter, Page};
use crate::services::metrics::{record_write, DB_QUERY_DURATION};
use crate::services::sorting::SortState;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, instrument};
use uuid::Uuid;

const ENTRY_COLUMNS: &str = r#"
    e.entry_id, e.user_id, e.title, e.amount, e.entry_date, e.entry_type,
    e.category_id, c.name AS category_name, e.notes, e.created_utc, e.updated_utc
"#;

/// Filter predicate shared by the list, count and export queries. Binds $1..=$9.
const ENTRY_FILTER: &str = r#"
    e.user_id = $1
    AND ($2::date IS NULL OR e.entry_date >= $2)
    AND ($3::date IS NULL OR e.entry_date <= $3)
    AND ($4::text IS NULL OR e.title ILIKE $4 ESCAPE '\')
    AND ($5::text IS NULL OR c.name ILIKE $5 ESCAPE '\')
    AND ($6::uuid IS NULL OR e.category_id = $6)
    AND ($7::numeric IS NULL OR e.amount >= $7)
    AND ($8::numeric IS NULL OR e.amount <= $8)
    AND ($9::varchar IS NULL OR e.entry_type = $9)
"#;

const BUDGET_COLUMNS: &str = r#"
    b.budget_id, b.user_id, b.category_id, c.name AS category_name, b.month, b.amount, b.created_utc
"#;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "budget-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Pool that connects on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy(database_url)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Invalid database URL: {}", e)))?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // User Operations
    // -------------------------------------------------------------------------

    /// Creates the account and seeds its default categories in one transaction.
    ///
    /// A duplicate email yields `AppError::Conflict`.
    #[instrument(skip(self, email, password_hash))]
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, password_hash, display_name)
            VALUES ($1, $2, $3, $4)
            RETURNING user_id, email, password_hash, display_name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Email address is already in use"))
            }
            other => AppError::from(other),
        })?;

        for name in DEFAULT_CATEGORIES {
            sqlx::query("INSERT INTO categories (category_id, user_id, name) VALUES ($1, $2, $3)")
                .bind(Uuid::new_v4())
                .bind(user.user_id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        timer.observe_duration();
        record_write("user", "create");

        info!(user_id = %user.user_id, "User registered");

        Ok(user)
    }

    #[instrument(skip(self, email))]
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, password_hash, display_name, created_utc
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, password_hash, display_name, created_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, password_hash), fields(user_id = %user_id))]
    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        record_write("user", "password");
        info!("Password changed");
        Ok(())
    }

    /// Stores a reset token hash, replacing the user's earlier unused ones.
    #[instrument(skip(self, token_hash), fields(user_id = %user_id))]
    pub async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM password_resets WHERE user_id = $1 AND used_utc IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO password_resets (token_hash, user_id, expires_utc) VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        record_write("password_reset", "create");
        Ok(())
    }

    /// Owner of an unused, unexpired reset token.
    #[instrument(skip(self, token_hash))]
    pub async fn password_reset_user(&self, token_hash: &str) -> Result<Option<Uuid>, AppError> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM password_resets
            WHERE token_hash = $1 AND used_utc IS NULL AND expires_utc > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    /// Spends the token and sets the new password in one transaction.
    ///
    /// `None` when the token is unknown, used or expired; nothing changes then.
    #[instrument(skip(self, token_hash, password_hash))]
    pub async fn reset_password(
        &self,
        token_hash: &str,
        password_hash: &str,
    ) -> Result<Option<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reset_password"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE password_resets SET used_utc = NOW()
            WHERE token_hash = $1 AND used_utc IS NULL AND expires_utc > NOW()
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        sqlx::query("UPDATE users SET password_hash = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM password_resets WHERE user_id = $1 AND used_utc IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        timer.observe_duration();
        record_write("user", "password_reset");

        info!(user_id = %user_id, "Password reset");
        Ok(Some(user_id))
    }

    // -------------------------------------------------------------------------
    // Category Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_categories(&self, user_id: Uuid) -> Result<Vec<Category>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_categories"])
            .start_timer();

        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT category_id, user_id, name, created_utc
            FROM categories
            WHERE user_id = $1
            ORDER BY lower(name), category_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(categories)
    }

    #[instrument(skip(self), fields(user_id = %user_id, category_id = %category_id))]
    pub async fn get_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
    ) -> Result<Option<Category>, AppError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT category_id, user_id, name, created_utc
            FROM categories
            WHERE user_id = $1 AND category_id = $2
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    /// Names are unique per user, case-insensitively; duplicates yield `AppError::Conflict`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn create_category(&self, user_id: Uuid, name: &str) -> Result<Category, AppError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (category_id, user_id, name)
            VALUES ($1, $2, $3)
            RETURNING category_id, user_id, name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("A category named '{}' already exists", name))
            }
            other => AppError::from(other),
        })?;

        record_write("category", "create");
        info!(category_id = %category.category_id, "Category created");

        Ok(category)
    }

    #[instrument(skip(self), fields(user_id = %user_id, category_id = %category_id))]
    pub async fn rename_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        name: &str,
    ) -> Result<Option<Category>, AppError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET name = $3
            WHERE user_id = $1 AND category_id = $2
            RETURNING category_id, user_id, name, created_utc
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("A category named '{}' already exists", name))
            }
            other => AppError::from(other),
        })?;

        if category.is_some() {
            record_write("category", "update");
        }

        Ok(category)
    }

    /// Deletes a category. Its entries become uncategorized and its budgets are removed
    /// (enforced by the foreign keys). Returns false when no such category is owned.
    #[instrument(skip(self), fields(user_id = %user_id, category_id = %category_id))]
    pub async fn delete_category(&self, user_id: Uuid, category_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let reassigned = sqlx::query(
            "UPDATE entries SET category_id = NULL, updated_utc = NOW() WHERE user_id = $1 AND category_id = $2",
        )
        .bind(user_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let deleted = sqlx::query("DELETE FROM categories WHERE user_id = $1 AND category_id = $2")
            .bind(user_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        if deleted > 0 {
            record_write("category", "delete");
            info!(reassigned_entries = reassigned, "Category deleted");
        }

        Ok(deleted > 0)
    }

    // -------------------------------------------------------------------------
    // Entry Operations
    // -------------------------------------------------------------------------

    async fn owns_category(
        tx: &mut sqlx::PgConnection,
        user_id: Uuid,
        category_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let Some(category_id) = category_id else {
            return Ok(true);
        };

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM categories WHERE user_id = $1 AND category_id = $2)",
        )
        .bind(user_id)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(exists)
    }

    async fn fetch_entry(
        conn: &mut sqlx::PgConnection,
        user_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<Entry>, AppError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e LEFT JOIN categories c ON c.category_id = e.category_id \
             WHERE e.user_id = $1 AND e.entry_id = $2"
        );
        let entry = sqlx::query_as::<_, Entry>(&sql)
            .bind(user_id)
            .bind(entry_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(entry)
    }

    /// Creates an entry. A category owned by someone else is `NotFound`; a duplicate
    /// (title, date, category) is `Conflict`.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn create_entry(&self, user_id: Uuid, input: &EntryInput) -> Result<Entry, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_entry"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        if !Self::owns_category(&mut tx, user_id, input.category_id).await? {
            return Err(AppError::not_found("Category"));
        }

        let entry_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO entries (entry_id, user_id, title, amount, entry_date, entry_type, category_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry_id)
        .bind(user_id)
        .bind(&input.title)
        .bind(input.amount)
        .bind(input.entry_date)
        .bind(input.entry_type.as_str())
        .bind(input.category_id)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_entry)?;

        let entry = Self::fetch_entry(&mut tx, user_id, entry_id)
            .await?
            .ok_or_else(|| AppError::not_found("Entry"))?;

        tx.commit().await?;
        timer.observe_duration();
        record_write("entry", "create");

        info!(entry_id = %entry.entry_id, entry_type = %entry.entry_type, "Entry created");

        Ok(entry)
    }

    #[instrument(skip(self), fields(user_id = %user_id, entry_id = %entry_id))]
    pub async fn get_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<Option<Entry>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_entry(&mut conn, user_id, entry_id).await
    }

    /// Updates an owned entry; `None` when the entry does not exist for this user.
    #[instrument(skip(self, input), fields(user_id = %user_id, entry_id = %entry_id))]
    pub async fn update_entry(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        input: &EntryInput,
    ) -> Result<Option<Entry>, AppError> {
        let mut tx = self.pool.begin().await?;

        if !Self::owns_category(&mut tx, user_id, input.category_id).await? {
            return Err(AppError::not_found("Category"));
        }

        let updated = sqlx::query(
            r#"
            UPDATE entries
            SET title = $3, amount = $4, entry_date = $5, entry_type = $6,
                category_id = $7, notes = $8, updated_utc = NOW()
            WHERE user_id = $1 AND entry_id = $2
            "#,
        )
        .bind(user_id)
        .bind(entry_id)
        .bind(&input.title)
        .bind(input.amount)
        .bind(input.entry_date)
        .bind(input.entry_type.as_str())
        .bind(input.category_id)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_entry)?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }

        let entry = Self::fetch_entry(&mut tx, user_id, entry_id).await?;
        tx.commit().await?;
        record_write("entry", "update");

        Ok(entry)
    }

    #[instrument(skip(self), fields(user_id = %user_id, entry_id = %entry_id))]
    pub async fn delete_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<bool, AppError> {
        let deleted = sqlx::query("DELETE FROM entries WHERE user_id = $1 AND entry_id = $2")
            .bind(user_id)
            .bind(entry_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted > 0 {
            record_write("entry", "delete");
        }

        Ok(deleted > 0)
    }

    /// One page of filtered entries plus the total match count.
    #[instrument(skip(self, filter), fields(user_id = %user_id, page = page))]
    pub async fn list_entries(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
        sort: &SortState,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Entry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_entries"])
            .start_timer();

        let per_page = clamp_page_size(per_page);
        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let count_sql = format!(
            "SELECT COUNT(*) FROM entries e LEFT JOIN categories c ON c.category_id = e.category_id WHERE {ENTRY_FILTER}"
        );
        let total: i64 = bind_filter(sqlx::query_scalar(&count_sql), user_id, filter)
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e LEFT JOIN categories c ON c.category_id = e.category_id \
             WHERE {ENTRY_FILTER} ORDER BY {} LIMIT $10 OFFSET $11",
            sort.order_by_sql()
        );
        let items = bind_filter_as(sqlx::query_as::<_, Entry>(&list_sql), user_id, filter)
            .bind(i64::from(per_page))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        timer.observe_duration();

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Every entry matching the filter, for reports and aggregation.
    #[instrument(skip(self, filter), fields(user_id = %user_id))]
    pub async fn filtered_entries(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<Entry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["filtered_entries"])
            .start_timer();

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e LEFT JOIN categories c ON c.category_id = e.category_id \
             WHERE {ENTRY_FILTER} ORDER BY e.entry_date, e.created_utc, e.entry_id"
        );
        let entries = bind_filter_as(sqlx::query_as::<_, Entry>(&sql), user_id, filter)
            .fetch_all(&self.pool)
            .await?;

        timer.observe_duration();

        Ok(entries)
    }

    /// Sends every matching entry to `sink` in chunks of `chunk_size`, read by a single
    /// query so the rows come from one snapshot. Stops early when the receiver is gone.
    /// Returns the number of entries sent.
    #[instrument(skip(self, filter, sort, sink), fields(user_id = %user_id))]
    pub async fn stream_entries(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
        sort: &SortState,
        chunk_size: usize,
        sink: mpsc::Sender<Vec<Entry>>,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["stream_entries"])
            .start_timer();

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e LEFT JOIN categories c ON c.category_id = e.category_id \
             WHERE {ENTRY_FILTER} ORDER BY {}",
            sort.order_by_sql()
        );
        let mut rows =
            bind_filter_as(sqlx::query_as::<_, Entry>(&sql), user_id, filter).fetch(&self.pool);

        let chunk_size = chunk_size.max(1);
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut sent = 0u64;

        while let Some(entry) = rows.next().await {
            chunk.push(entry?);
            if chunk.len() == chunk_size {
                let len = chunk.len() as u64;
                if sink.send(std::mem::take(&mut chunk)).await.is_err() {
                    return Ok(sent);
                }
                sent += len;
            }
        }

        if !chunk.is_empty() {
            let len = chunk.len() as u64;
            if sink.send(chunk).await.is_ok() {
                sent += len;
            }
        }

        timer.observe_duration();

        Ok(sent)
    }

    /// Entries dated within `[from, to]`.
    pub async fn entries_between(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Entry>, AppError> {
        let filter = EntryFilter {
            from: Some(from),
            to: Some(to),
            ..EntryFilter::default()
        };
        self.filtered_entries(user_id, &filter).await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn recent_entries(&self, user_id: Uuid, limit: i64) -> Result<Vec<Entry>, AppError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e LEFT JOIN categories c ON c.category_id = e.category_id \
             WHERE e.user_id = $1 ORDER BY e.entry_date DESC, e.created_utc DESC LIMIT $2"
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(user_id)
            .bind(limit.clamp(1, 100))
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    // -------------------------------------------------------------------------
    // Budget Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(user_id = %user_id, month = %month))]
    pub async fn list_budgets(&self, user_id: Uuid, month: NaiveDate) -> Result<Vec<Budget>, AppError> {
        let sql = format!(
            "SELECT {BUDGET_COLUMNS} FROM budgets b LEFT JOIN categories c ON c.category_id = b.category_id \
             WHERE b.user_id = $1 AND b.month = $2 \
             ORDER BY b.category_id IS NOT NULL, lower(COALESCE(c.name, ''))"
        );
        let budgets = sqlx::query_as::<_, Budget>(&sql)
            .bind(user_id)
            .bind(month)
            .fetch_all(&self.pool)
            .await?;

        Ok(budgets)
    }

    /// Inserts or updates the budget for `(month, category)`.
    ///
    /// Rejected when an overall budget would drop below the month's category budgets, or a
    /// category budget would push their sum above the overall budget.
    #[instrument(skip(self, input), fields(user_id = %user_id, month = %input.month))]
    pub async fn set_budget(&self, user_id: Uuid, input: &BudgetInput) -> Result<BudgetWrite, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_budget"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        if !Self::owns_category(&mut tx, user_id, input.category_id).await? {
            return Err(AppError::not_found("Category"));
        }

        // Serializes concurrent budget writes for the same user.
        sqlx::query("SELECT user_id FROM users WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let category_sum: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM budgets
            WHERE user_id = $1 AND month = $2 AND category_id IS NOT NULL
              AND ($3::uuid IS NULL OR category_id <> $3)
            "#,
        )
        .bind(user_id)
        .bind(input.month)
        .bind(input.category_id)
        .fetch_one(&mut *tx)
        .await?;

        match input.category_id {
            None => {
                if input.amount < category_sum {
                    return Ok(BudgetWrite::Rejected(format!(
                        "Overall budget must be at least {:.2}, the sum of this month's category budgets.",
                        category_sum
                    )));
                }
            }
            Some(_) => {
                let overall: Option<Decimal> = sqlx::query_scalar(
                    "SELECT amount FROM budgets WHERE user_id = $1 AND month = $2 AND category_id IS NULL",
                )
                .bind(user_id)
                .bind(input.month)
                .fetch_optional(&mut *tx)
                .await?;

                if let Some(overall) = overall {
                    if category_sum + input.amount > overall {
                        return Ok(BudgetWrite::Rejected(format!(
                            "Category budgets would total {:.2}, above the overall budget of {:.2}.",
                            category_sum + input.amount,
                            overall
                        )));
                    }
                }
            }
        }

        let upsert = match input.category_id {
            None => {
                r#"
                INSERT INTO budgets (budget_id, user_id, category_id, month, amount)
                VALUES ($1, $2, NULL, $3, $4)
                ON CONFLICT (user_id, month) WHERE category_id IS NULL
                DO UPDATE SET amount = EXCLUDED.amount
                RETURNING budget_id
                "#
            }
            Some(_) => {
                r#"
                INSERT INTO budgets (budget_id, user_id, category_id, month, amount)
                VALUES ($1, $2, $5, $3, $4)
                ON CONFLICT (user_id, category_id, month)
                DO UPDATE SET amount = EXCLUDED.amount
                RETURNING budget_id
                "#
            }
        };

        let mut query = sqlx::query_scalar::<_, Uuid>(upsert)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(input.month)
            .bind(input.amount);
        if input.category_id.is_some() {
            query = query.bind(input.category_id);
        }
        let budget_id = query.fetch_one(&mut *tx).await?;

        let sql = format!(
            "SELECT {BUDGET_COLUMNS} FROM budgets b LEFT JOIN categories c ON c.category_id = b.category_id \
             WHERE b.user_id = $1 AND b.budget_id = $2"
        );
        let budget = sqlx::query_as::<_, Budget>(&sql)
            .bind(user_id)
            .bind(budget_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        timer.observe_duration();
        record_write("budget", "upsert");

        info!(budget_id = %budget.budget_id, "Budget saved");

        Ok(BudgetWrite::Saved(budget))
    }

    #[instrument(skip(self), fields(user_id = %user_id, budget_id = %budget_id))]
    pub async fn delete_budget(&self, user_id: Uuid, budget_id: Uuid) -> Result<bool, AppError> {
        let deleted = sqlx::query("DELETE FROM budgets WHERE user_id = $1 AND budget_id = $2")
            .bind(user_id)
            .bind(budget_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted > 0 {
            record_write("budget", "delete");
        }

        Ok(deleted > 0)
    }
}

fn duplicate_entry(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AppError::Conflict(
            anyhow::anyhow!("An entry with this title, date and category already exists"),
        ),
        other => AppError::from(other),
    }
}

fn bind_filter<'q, O>(
    query: sqlx::query::QueryScalar<'q, sqlx::Postgres, O, PgArguments>,
    user_id: Uuid,
    filter: &'q EntryFilter,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, O, PgArguments> {
    query
        .bind(user_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.title_contains.as_deref().map(like_pattern))
        .bind(filter.category_contains.as_deref().map(like_pattern))
        .bind(filter.category_id)
        .bind(filter.min)
        .bind(filter.max)
        .bind(filter.entry_type.map(|t| t.as_str()))
}

fn bind_filter_as<'q, O>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>,
    user_id: Uuid,
    filter: &'q EntryFilter,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments> {
    query
        .bind(user_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.title_contains.as_deref().map(like_pattern))
        .bind(filter.category_contains.as_deref().map(like_pattern))
        .bind(filter.category_id)
        .bind(filter.min)
        .bind(filter.max)
        .bind(filter.entry_type.map(|t| t.as_str()))
}
