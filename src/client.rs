use crate::{
    Error,
    ResponseError,
    models::PurchaseRequest,
};
use reqwest::{
    StatusCode,
    header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;

pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Raw outcome of one service call: status code, transport-level error
/// string, media type and body. Validation happens at the call site so
/// every endpoint shares the same rejection rules.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub code: StatusCode,
    pub error: String,
    pub media_type: String,
    pub body: String,
}

impl RawResponse {
    /// Success status and an empty error string, nothing else.
    pub fn check(&self) -> Result<(), ResponseError> {
        if !self.code.is_success() || !self.error.is_empty() {
            return Err(ResponseError::Status {
                code: self.code,
                error: self.error.clone(),
            });
        }
        Ok(())
    }

    /// Full validation for payload-carrying endpoints: accepted status,
    /// JSON media type, non-empty body, well-formed payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ResponseError> {
        self.check()?;
        if self.media_type != JSON_MEDIA_TYPE {
            return Err(ResponseError::MediaType(self.media_type.clone()));
        }
        if self.body.is_empty() {
            return Err(ResponseError::EmptyBody);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Transport seam for the IAP service endpoints. The production
/// implementation is [`HttpServiceClient`]; tests script responses
/// through a fake.
pub trait ServiceApi: Clone + Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = crate::Result<RawResponse>> + Send;

    fn fetch_products(
        &self,
        agent_address: &str,
    ) -> impl Future<Output = crate::Result<RawResponse>> + Send;

    fn request_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> impl Future<Output = crate::Result<RawResponse>> + Send;

    fn poll_status(
        &self,
        receipt_ids: &[String],
    ) -> impl Future<Output = crate::Result<RawResponse>> + Send;
}

#[derive(Clone)]
pub struct HttpServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpServiceClient {
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Connect(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> crate::Result<RawResponse> {
        let res = request
            .send()
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        let code = res.status();
        let media_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or("").trim().to_string())
            .unwrap_or_default();
        let body = res
            .text()
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        Ok(RawResponse {
            code,
            error: String::new(),
            media_type,
            body,
        })
    }
}

impl ServiceApi for HttpServiceClient {
    async fn ping(&self) -> crate::Result<RawResponse> {
        let url = format!("{}/ping", self.base_url);
        self.execute(self.http.get(url)).await
    }

    async fn fetch_products(&self, agent_address: &str) -> crate::Result<RawResponse> {
        let url = format!("{}/product", self.base_url);
        self.execute(self.http.get(url).query(&[("agent_addr", agent_address)]))
            .await
    }

    async fn request_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> crate::Result<RawResponse> {
        let url = format!("{}/purchase/request", self.base_url);
        self.execute(self.http.post(url).json(request)).await
    }

    async fn poll_status(&self, receipt_ids: &[String]) -> crate::Result<RawResponse> {
        let url = format!("{}/purchase/status", self.base_url);
        let query: Vec<(&str, &str)> =
            receipt_ids.iter().map(|id| ("uuid", id.as_str())).collect();
        self.execute(self.http.get(url).query(&query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;

    fn raw(code: StatusCode, error: &str, media_type: &str, body: &str) -> RawResponse {
        RawResponse {
            code,
            error: error.to_string(),
            media_type: media_type.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn decode__well_formed_response__yields_payload() {
        let body = r#"[{"id":"p1","name":"Chest","price":4.99,"currency":"USD"}]"#;
        let res = raw(StatusCode::OK, "", JSON_MEDIA_TYPE, body);
        let products: Vec<Product> = res.decode().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "p1");
    }

    #[test]
    fn decode__non_success_status__is_rejected() {
        let res = raw(StatusCode::BAD_GATEWAY, "", JSON_MEDIA_TYPE, "[]");
        let err = res.decode::<Vec<Product>>().unwrap_err();
        assert!(matches!(err, ResponseError::Status { .. }));
    }

    #[test]
    fn decode__non_empty_error__is_rejected_even_with_ok_status() {
        let res = raw(StatusCode::OK, "backend unavailable", JSON_MEDIA_TYPE, "[]");
        let err = res.decode::<Vec<Product>>().unwrap_err();
        assert!(matches!(err, ResponseError::Status { .. }));
    }

    #[test]
    fn decode__wrong_media_type__is_rejected() {
        let res = raw(StatusCode::OK, "", "text/html", "[]");
        let err = res.decode::<Vec<Product>>().unwrap_err();
        assert!(matches!(err, ResponseError::MediaType(_)));
    }

    #[test]
    fn decode__empty_body__is_rejected() {
        let res = raw(StatusCode::OK, "", JSON_MEDIA_TYPE, "");
        let err = res.decode::<Vec<Product>>().unwrap_err();
        assert!(matches!(err, ResponseError::EmptyBody));
    }

    #[test]
    fn decode__malformed_body__is_rejected() {
        let res = raw(StatusCode::OK, "", JSON_MEDIA_TYPE, "not json");
        let err = res.decode::<Vec<Product>>().unwrap_err();
        assert!(matches!(err, ResponseError::Payload(_)));
    }
}
