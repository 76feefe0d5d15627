use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::storage::BlobId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use thiserror::Error;

use crate::entity::avatar;

/// The stored association between an avatar id and its two blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarRecord {
    pub id: String,
    pub origin: BlobId,
    pub thumb: BlobId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvatarRecord {
    pub fn new(id: impl Into<String>, origin: BlobId, thumb: BlobId) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            origin,
            thumb,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the thumbnail is the origin blob itself.
    pub fn is_aliased(&self) -> bool {
        self.origin == self.thumb
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("avatar not found: {0}")]
    NotFound(String),
    #[error("avatar already exists: {0}")]
    DuplicateId(String),
    #[error("avatar record {0} holds a malformed blob id")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Persistence of [`AvatarRecord`]s.
///
/// The update operations are compare-and-set: they apply only while the
/// record still references the expected blobs and report whether they did.
#[async_trait]
pub trait AvatarRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<AvatarRecord, RepositoryError>;

    /// Fails with [`RepositoryError::DuplicateId`] if the id is taken.
    async fn insert(&self, record: &AvatarRecord) -> Result<(), RepositoryError>;

    async fn set_thumb(
        &self,
        id: &str,
        expected: BlobId,
        thumb: BlobId,
    ) -> Result<bool, RepositoryError>;

    async fn replace_blobs(
        &self,
        id: &str,
        expected: &AvatarRecord,
        origin: BlobId,
        thumb: BlobId,
    ) -> Result<bool, RepositoryError>;

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;
}

impl TryFrom<avatar::Model> for AvatarRecord {
    type Error = RepositoryError;

    fn try_from(model: avatar::Model) -> Result<Self, Self::Error> {
        let parse = |hex: &str| {
            BlobId::from_hex(hex).map_err(|_| RepositoryError::Corrupt(model.id.clone()))
        };
        Ok(Self {
            origin: parse(&model.origin)?,
            thumb: parse(&model.thumb)?,
            id: model.id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// SQL-backed repository over the `avatar` table.
#[derive(Clone)]
pub struct SeaOrmAvatarRepository {
    db: DatabaseConnection,
}

impl SeaOrmAvatarRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AvatarRepository for SeaOrmAvatarRepository {
    async fn find(&self, id: &str) -> Result<AvatarRecord, RepositoryError> {
        avatar::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .try_into()
    }

    async fn insert(&self, record: &AvatarRecord) -> Result<(), RepositoryError> {
        let model = avatar::ActiveModel {
            id: Set(record.id.clone()),
            origin: Set(record.origin.to_hex()),
            thumb: Set(record.thumb.to_hex()),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };

        match avatar::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(RepositoryError::DuplicateId(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_thumb(
        &self,
        id: &str,
        expected: BlobId,
        thumb: BlobId,
    ) -> Result<bool, RepositoryError> {
        let result = avatar::Entity::update_many()
            .col_expr(avatar::Column::Thumb, Expr::value(thumb.to_hex()))
            .col_expr(avatar::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(avatar::Column::Id.eq(id))
            .filter(avatar::Column::Thumb.eq(expected.to_hex()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn replace_blobs(
        &self,
        id: &str,
        expected: &AvatarRecord,
        origin: BlobId,
        thumb: BlobId,
    ) -> Result<bool, RepositoryError> {
        let result = avatar::Entity::update_many()
            .col_expr(avatar::Column::Origin, Expr::value(origin.to_hex()))
            .col_expr(avatar::Column::Thumb, Expr::value(thumb.to_hex()))
            .col_expr(avatar::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(avatar::Column::Id.eq(id))
            .filter(avatar::Column::Origin.eq(expected.origin.to_hex()))
            .filter(avatar::Column::Thumb.eq(expected.thumb.to_hex()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = avatar::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

/// Process-local repository, for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryAvatarRepository {
    records: DashMap<String, AvatarRecord>,
}

impl MemoryAvatarRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AvatarRepository for MemoryAvatarRepository {
    async fn find(&self, id: &str) -> Result<AvatarRecord, RepositoryError> {
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn insert(&self, record: &AvatarRecord) -> Result<(), RepositoryError> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::DuplicateId(record.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn set_thumb(
        &self,
        id: &str,
        expected: BlobId,
        thumb: BlobId,
    ) -> Result<bool, RepositoryError> {
        match self.records.get_mut(id) {
            Some(mut record) if record.thumb == expected => {
                record.thumb = thumb;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_blobs(
        &self,
        id: &str,
        expected: &AvatarRecord,
        origin: BlobId,
        thumb: BlobId,
    ) -> Result<bool, RepositoryError> {
        match self.records.get_mut(id) {
            Some(mut record)
                if record.origin == expected.origin && record.thumb == expected.thumb =>
            {
                record.origin = origin;
                record.thumb = thumb;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.records.remove(id).is_some())
    }
}
