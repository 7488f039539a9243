use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::debug;

use crate::app::ports::ArchiveStore;
use crate::error::{PipelineError, Result};

/// Archive sink backed by any `object_store` backend.
pub struct ObjectArchive {
    store: Arc<dyn ObjectStore>,
    /// Whether the backend keeps object attributes such as content type.
    supports_attributes: bool,
}

impl ObjectArchive {
    pub fn new(store: Arc<dyn ObjectStore>, supports_attributes: bool) -> Self {
        Self {
            store,
            supports_attributes,
        }
    }

    /// S3 bucket; region and credentials come from the standard AWS environment.
    pub fn s3(bucket: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build S3 client: {}", e)))?;
        Ok(Self::new(Arc::new(store), true))
    }

    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store), false))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), true)
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl ArchiveStore for ObjectArchive {
    /// Reserved characters in a key segment are percent-encoded by the store;
    /// the returned key is the encoded one.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        let path = ObjectPath::from(key);
        let size = body.len();
        let payload = PutPayload::from(body);

        if self.supports_attributes {
            let opts = PutOptions {
                attributes: Attributes::from_iter([(Attribute::ContentType, content_type.to_string())]),
                ..Default::default()
            };
            self.store.put_opts(&path, payload, opts).await?;
        } else {
            self.store.put(&path, payload).await?;
        }

        debug!(key = %path, size, "archived message");
        Ok(path.to_string())
    }
}
