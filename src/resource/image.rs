//! Image handle.

use crate::archive;
use crate::client::EngineClient;
use crate::config::{ImageRef, ImageSpec};
use crate::{is_gone, Error, Result};
use futures::stream::StreamExt;
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// An engine-bound image: pulled from a registry or built from a Dockerfile
/// directory.
pub struct ImageHandle {
    spec: ImageSpec,
    client: OnceCell<EngineClient>,
}

impl ImageHandle {
    pub(crate) fn from_spec(spec: ImageSpec) -> Self {
        Self {
            spec,
            client: OnceCell::new(),
        }
    }

    /// The image reference this handle pulls or tags.
    pub fn reference(&self) -> Option<&ImageRef> {
        self.spec.reference()
    }

    async fn client(&self) -> Result<EngineClient> {
        self.client
            .get_or_try_init(|| EngineClient::for_endpoint_override(self.spec.endpoint.as_deref()))
            .await
            .cloned()
    }

    fn canonical(&self) -> Result<String> {
        self.spec
            .reference()
            .map(ImageRef::canonical)
            .ok_or_else(|| Error::Configuration("image handle has no reference".to_string()))
    }

    /// Whether the image exists locally.
    pub async fn exists(&self) -> Result<bool> {
        let reference = self.canonical()?;
        let client = self.client().await?;
        match client.docker().inspect_image(&reference).await {
            Ok(_) => Ok(true),
            Err(e) if is_gone(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Make the image available locally: build it when a Dockerfile
    /// directory is configured, otherwise pull it unless already present.
    pub async fn ensure(&self) -> Result<String> {
        if self.spec.dockerfile_dir().is_some() {
            return self.build().await;
        }

        let reference = self.canonical()?;
        if self.exists().await? {
            debug!("Image {} already exists locally", reference);
            return Ok(reference);
        }
        self.pull().await
    }

    /// Pull the image from its registry.
    pub async fn pull(&self) -> Result<String> {
        let reference = self.canonical()?;
        let client = self.client().await?;
        info!("Pulling image: {}", reference);

        let credentials = self
            .spec
            .registry_auth
            .as_ref()
            .map(|auth| auth.to_credentials());

        let mut stream = client.docker().create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: reference.clone(),
                ..Default::default()
            }),
            None,
            credentials,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Pull: {}", status);
                    }
                    if let Some(error) = progress.error {
                        return Err(Error::Execution(format!("pull failed: {error}")));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("Successfully pulled image: {}", reference);
        Ok(reference)
    }

    /// Build the image from the configured Dockerfile directory, streaming
    /// the gzip'd tar context to the engine.
    pub async fn build(&self) -> Result<String> {
        let reference = self.canonical()?;
        let dir = self.spec.dockerfile_dir().ok_or_else(|| {
            Error::Configuration("no Dockerfile directory configured".to_string())
        })?;

        let client = self.client().await?;
        info!("Building image {} from {:?}", reference, dir);

        let context = archive::gzipped_dir(dir)?;
        let buildargs: HashMap<String, String> = self.spec.build_args.clone();
        let labels: HashMap<String, String> = self.spec.labels.clone();

        let options = bollard::image::BuildImageOptions {
            dockerfile: self
                .spec
                .dockerfile
                .clone()
                .unwrap_or_else(|| "Dockerfile".to_string()),
            t: reference.clone(),
            rm: true,
            buildargs,
            labels,
            ..Default::default()
        };

        let mut stream = client.docker().build_image(
            options,
            None,
            Some(bollard::body_full(bytes::Bytes::from(context))),
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(line) = progress.stream {
                        debug!("Build: {}", line.trim_end());
                    }
                    if let Some(error) = progress.error {
                        return Err(Error::Execution(format!("build failed: {error}")));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("Successfully built image: {}", reference);
        Ok(reference)
    }

    /// Remove the image. Idempotent: a missing image counts as removed.
    pub async fn remove(&self, force: bool) -> Result<()> {
        let reference = self.canonical()?;
        let client = self.client().await?;
        debug!("Removing image: {}", reference);

        match client
            .docker()
            .remove_image(
                &reference,
                Some(bollard::image::RemoveImageOptions {
                    force,
                    ..Default::default()
                }),
                None,
            )
            .await
        {
            Ok(_) => {
                info!("Removed image: {}", reference);
                Ok(())
            }
            Err(e) if is_gone(&e) => {
                debug!("Image {} already gone", reference);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle")
            .field("reference", &self.spec.reference())
            .field("dockerfile_dir", &self.spec.dockerfile_dir())
            .finish_non_exhaustive()
    }
}
