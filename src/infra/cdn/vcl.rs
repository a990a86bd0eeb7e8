//! Service version endpoints: versions, snippets, conditions and friends.

use edgepurge_api_types::{
    Acl, Dictionary, IoSettings, IoSettingsDocument, Snippet, ValidationReport, VersionObject,
    VersionSummary,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use super::{CdnClient, CdnError};

impl CdnClient {
    fn version_path(&self, suffix: &str) -> String {
        format!("service/{}/version{suffix}", self.service_id())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CdnError> {
        Self::send(self.request(Method::GET, path)?).await
    }

    pub async fn versions(&self) -> Result<Vec<VersionSummary>, CdnError> {
        self.get_json(&self.version_path("")).await
    }

    pub async fn active_version(&self) -> Result<Option<VersionSummary>, CdnError> {
        Ok(self
            .versions()
            .await?
            .into_iter()
            .find(|version| version.active))
    }

    pub async fn clone_version(&self, number: u32) -> Result<VersionSummary, CdnError> {
        let path = self.version_path(&format!("/{number}/clone"));
        Self::send(self.request(Method::PUT, &path)?).await
    }

    pub async fn validate_version(&self, number: u32) -> Result<ValidationReport, CdnError> {
        self.get_json(&self.version_path(&format!("/{number}/validate")))
            .await
    }

    pub async fn activate_version(&self, number: u32) -> Result<VersionSummary, CdnError> {
        let path = self.version_path(&format!("/{number}/activate"));
        Self::send(self.request(Method::PUT, &path)?).await
    }

    /// Raw JSON of a named object on `version`, `None` when it does not exist.
    pub async fn get_object<T: VersionObject>(
        &self,
        version: u32,
        name: &str,
    ) -> Result<Option<serde_json::Value>, CdnError> {
        let path = self.version_path(&format!("/{version}/{}/{name}", T::COLLECTION));
        let response = self.request(Method::GET, &path)?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::handle(response).await.map(Some)
    }

    pub async fn create_object<T: VersionObject>(
        &self,
        version: u32,
        object: &T,
    ) -> Result<serde_json::Value, CdnError> {
        let path = self.version_path(&format!("/{version}/{}", T::COLLECTION));
        self.send_form(Method::POST, &path, object).await
    }

    pub async fn update_object<T: VersionObject>(
        &self,
        version: u32,
        object: &T,
    ) -> Result<serde_json::Value, CdnError> {
        let path = self.version_path(&format!(
            "/{version}/{}/{}",
            T::COLLECTION,
            object.name()
        ));
        self.send_form(Method::PUT, &path, object).await
    }

    /// Update `object` when it already exists on `version`, create it otherwise.
    pub async fn upsert_object<T: VersionObject>(
        &self,
        version: u32,
        object: &T,
    ) -> Result<serde_json::Value, CdnError> {
        match self.get_object::<T>(version, object.name()).await? {
            Some(_) => self.update_object(version, object).await,
            None => self.create_object(version, object).await,
        }
    }

    async fn send_form<T: VersionObject>(
        &self,
        method: Method,
        path: &str,
        object: &T,
    ) -> Result<serde_json::Value, CdnError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(object.form_fields())
            .finish();
        let request = self
            .request(method, path)?
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body);
        Self::send(request).await
    }

    pub async fn snippets(&self, version: u32) -> Result<Vec<Snippet>, CdnError> {
        self.get_json(&self.version_path(&format!("/{version}/snippet")))
            .await
    }

    pub async fn delete_snippet(&self, version: u32, name: &str) -> Result<(), CdnError> {
        let path = self.version_path(&format!("/{version}/snippet/{name}"));
        let _: serde_json::Value = Self::send(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }

    pub async fn acls(&self, version: u32) -> Result<Vec<Acl>, CdnError> {
        self.get_json(&self.version_path(&format!("/{version}/acl")))
            .await
    }

    pub async fn dictionaries(&self, version: u32) -> Result<Vec<Dictionary>, CdnError> {
        self.get_json(&self.version_path(&format!("/{version}/dictionary")))
            .await
    }

    pub async fn patch_io_settings(
        &self,
        version: u32,
        settings: &IoSettings,
    ) -> Result<serde_json::Value, CdnError> {
        let path = self.version_path(&format!("/{version}/io_settings"));
        let document = IoSettingsDocument::new(self.service_id(), version, settings.clone());
        let request = self
            .request(Method::PATCH, &path)?
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.api+json")
            .json(&document);
        Self::send(request).await
    }

    /// Service-wide optimizer settings, `None` when image optimization is not enabled.
    pub async fn dynamic_io_settings(&self) -> Result<Option<serde_json::Value>, CdnError> {
        let path = format!("service/{}/dynamic_io_settings", self.service_id());
        let response = self.request(Method::GET, &path)?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::handle(response).await.map(Some)
    }
}
