//! Contacts endpoints

use serde_json::Value;

use crate::client::GhlClient;
use crate::error::{GhlError, Result};

impl GhlClient {
    /// Fetches a contact record (`GET /contacts/{contact_id}`)
    pub async fn get_contact(&self, access_token: &str, contact_id: &str) -> Result<Value> {
        if contact_id.trim().is_empty() {
            return Err(GhlError::ValidationError("contact_id is empty".to_string()));
        }

        let endpoint = format!("contacts/{}", urlencoding::encode(contact_id));
        self.get_json(access_token, &endpoint).await
    }

    /// Resolves the name of the pipeline the contact currently sits in.
    ///
    /// Returns an empty string when the record carries no pipeline.
    pub async fn get_contact_pipeline(&self, access_token: &str, contact_id: &str) -> Result<String> {
        let data = self.get_contact(access_token, contact_id).await?;
        let pipeline = pipeline_name(&data);

        tracing::info!("Contact {} is in pipeline: {:?}", contact_id, pipeline);

        Ok(pipeline)
    }
}

/// Extracts the pipeline name from a contact payload.
///
/// The API answers either with the contact at the top level or wrapped in `contact`,
/// and `pipeline` is either an object with a `name` or a bare value.
pub fn pipeline_name(data: &Value) -> String {
    let record = data.get("contact").unwrap_or(data);

    match record.get("pipeline") {
        Some(Value::Object(obj)) => obj
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(name)) => name.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_pipeline_name_from_object() {
        let data = json!({"pipeline": {"id": "p1", "name": "Sales"}});
        assert_eq!(pipeline_name(&data), "Sales");
    }

    #[test]
    fn test_pipeline_name_wrapped_in_contact() {
        let data = json!({"contact": {"pipeline": "Test (Sales Bot)"}});
        assert_eq!(pipeline_name(&data), "Test (Sales Bot)");
    }

    #[test]
    fn test_pipeline_name_missing() {
        assert_eq!(pipeline_name(&json!({"contact": {"id": "c1"}})), "");
        assert_eq!(pipeline_name(&json!({"pipeline": null})), "");
    }

    #[tokio::test]
    async fn test_get_contact_pipeline() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/contacts/c-42");
                then.status(200)
                    .json_body(json!({"contact": {"id": "c-42", "pipeline": {"name": "sales"}}}));
            })
            .await;

        let client = GhlClient::with_base_url(server.base_url()).unwrap();
        let pipeline = client.get_contact_pipeline("tok", "c-42").await.unwrap();

        assert_eq!(pipeline, "sales");
    }

    #[tokio::test]
    async fn test_empty_contact_id_rejected_without_request() {
        let client = GhlClient::with_base_url("http://127.0.0.1:1").unwrap();
        let err = client.get_contact("tok", "  ").await.unwrap_err();
        assert!(matches!(err, GhlError::ValidationError(_)));
    }
}
