//! Object storage for staged inputs and forecast exports.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use coldcast_core::{ColdcastConfig, Error, Result, S3Uri};
use reqwest::{Method, Url};
use tracing::{debug, info};

use crate::http::{parse_endpoint, xml_error, xml_tag, xml_tags, SignedClient};
use crate::sigv4::{sha256_hex, uri_encode, Credentials};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, uri: &S3Uri, body: Vec<u8>) -> Result<()>;

    async fn get_object(&self, uri: &S3Uri) -> Result<Vec<u8>>;

    /// Every object whose key starts with `prefix.key`, sorted by key.
    async fn list_objects(&self, prefix: &S3Uri) -> Result<Vec<S3Uri>>;
}

// ---------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------

/// Directory-backed store: `s3://bucket/key` lives at `<root>/bucket/key`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, uri: &S3Uri) -> Result<PathBuf> {
        let relative = Path::new(&uri.bucket).join(&uri.key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Storage(format!("refusing unsafe object path {}", uri)));
        }
        Ok(self.root.join(relative))
    }
}

fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, uri: &S3Uri, body: Vec<u8>) -> Result<()> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, body)?;
        debug!("Stored {} at {}", uri, path.display());
        Ok(())
    }

    async fn get_object(&self, uri: &S3Uri) -> Result<Vec<u8>> {
        let path = self.path_for(uri)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, prefix: &S3Uri) -> Result<Vec<S3Uri>> {
        let bucket_dir = self.root.join(&prefix.bucket);
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        walk_files(&bucket_dir, &mut files)?;

        let mut keys: Vec<String> = files
            .iter()
            .filter_map(|p| p.strip_prefix(&bucket_dir).ok())
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|k| k.starts_with(&prefix.key))
            .collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .map(|k| S3Uri::new(prefix.bucket.clone(), k))
            .collect())
    }
}

// ---------------------------------------------------------------
// S3 REST
// ---------------------------------------------------------------

/// Path-style S3 REST client.
pub struct S3ObjectStore {
    signer: SignedClient,
    endpoint: Url,
}

impl S3ObjectStore {
    pub fn new(config: &ColdcastConfig, credentials: Credentials) -> Result<Self> {
        let endpoint = config
            .s3_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com/", config.region));
        Ok(Self {
            signer: SignedClient::new(credentials, &config.region, "s3"),
            endpoint: parse_endpoint(&endpoint)?,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let path = format!("{}/{}", uri_encode(bucket, true), uri_encode(key, false));
        self.endpoint
            .join(&path)
            .map_err(|e| Error::Storage(format!("bad object path {}: {}", path, e)))
    }

    async fn request(&self, method: Method, url: Url, body: Vec<u8>) -> Result<Vec<u8>> {
        let mut headers = vec![("x-amz-content-sha256".to_string(), sha256_hex(&body))];
        if method == Method::PUT {
            headers.push(("content-type".to_string(), "text/csv".to_string()));
        }
        let response = self.signer.send(method, url, headers, body).await?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(xml_error(status.as_u16(), &String::from_utf8_lossy(&bytes)));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, uri: &S3Uri, body: Vec<u8>) -> Result<()> {
        let size = body.len();
        let url = self.object_url(&uri.bucket, &uri.key)?;
        self.request(Method::PUT, url, body).await?;
        info!("Uploaded {} ({} bytes)", uri, size);
        Ok(())
    }

    async fn get_object(&self, uri: &S3Uri) -> Result<Vec<u8>> {
        let url = self.object_url(&uri.bucket, &uri.key)?;
        self.request(Method::GET, url, Vec::new()).await
    }

    async fn list_objects(&self, prefix: &S3Uri) -> Result<Vec<S3Uri>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = self.object_url(&prefix.bucket, "")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("list-type", "2");
                query.append_pair("prefix", &prefix.key);
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
            }
            let body = self.request(Method::GET, url, Vec::new()).await?;
            let text = String::from_utf8_lossy(&body);
            keys.extend(xml_tags(&text, "Key"));

            let truncated = xml_tag(&text, "IsTruncated").as_deref() == Some("true");
            continuation = xml_tag(&text, "NextContinuationToken");
            if !truncated || continuation.is_none() {
                break;
            }
        }

        keys.sort();
        Ok(keys
            .into_iter()
            .map(|k| S3Uri::new(prefix.bucket.clone(), k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_put_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let train = S3Uri::new("bucket", "coldstart/train.csv");
        let meta = S3Uri::new("bucket", "coldstart/meta/item_metadata.csv");
        store.put_object(&train, b"a".to_vec()).await.unwrap();
        store.put_object(&meta, b"b".to_vec()).await.unwrap();
        store
            .put_object(&S3Uri::new("bucket", "other/x.csv"), b"c".to_vec())
            .await
            .unwrap();

        assert_eq!(store.get_object(&train).await.unwrap(), b"a");
        let listed = store
            .list_objects(&S3Uri::new("bucket", "coldstart/"))
            .await
            .unwrap();
        assert_eq!(listed, vec![meta, train]);

        assert!(store
            .list_objects(&S3Uri::new("empty-bucket", ""))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_local_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store
            .get_object(&S3Uri::new("bucket", "absent.csv"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_local_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store
            .put_object(&S3Uri::new("bucket", "../../etc/passwd"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_s3_object_url() {
        let config = ColdcastConfig {
            region: "us-west-2".into(),
            ..Default::default()
        };
        let store = S3ObjectStore::new(&config, Credentials::new("a", "b")).unwrap();
        let url = store.object_url("my-bucket", "cold start/train.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.us-west-2.amazonaws.com/my-bucket/cold%20start/train.csv"
        );
    }
}
