//! Built-in endpoints serving the generated document and Swagger UI.

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;

use crate::response::{BoxBody, html_response};

use super::OpenApi;

/// Holds the document built at serve time. Routes registered after the
/// first request are not reflected; registration is a startup concern.
#[derive(Debug, Clone)]
pub struct OpenApiRegistry {
    document: OpenApi,
    json: Bytes,
}

impl OpenApiRegistry {
    pub fn new(document: OpenApi) -> Self {
        let json = serde_json::to_vec_pretty(&document)
            .map(Bytes::from)
            .unwrap_or_default();
        Self { document, json }
    }

    pub fn document(&self) -> &OpenApi {
        &self.document
    }
}

/// Serves the document as pretty-printed JSON.
pub fn openapi_spec(registry: &OpenApiRegistry) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(registry.json.clone()))
        .unwrap_or_else(|_| {
            let mut res = Response::new(Full::new(Bytes::new()));
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res
        })
}

/// Serves the Swagger UI page, pointed at `spec_path`.
pub fn swagger_ui(title: &str, spec_path: &str) -> Response<BoxBody> {
    let page = format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {{
      SwaggerUIBundle({{
        url: "{spec_path}",
        dom_id: "#swagger-ui",
        deepLinking: true,
        layout: "BaseLayout",
      }});
    }};
  </script>
</body>
</html>"##
    );
    html_response(StatusCode::OK, page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::{DocBuilder, OpenApiConfig};

    fn registry() -> OpenApiRegistry {
        let docs = DocBuilder::new(OpenApiConfig::new("Test API", "1.0.0"));
        OpenApiRegistry::new(docs.build())
    }

    #[test]
    fn test_spec_endpoint_serves_json() {
        let res = openapi_spec(&registry());
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_spec_json_has_document_shape() {
        let reg = registry();
        let parsed: serde_json::Value = serde_json::from_slice(&reg.json).unwrap();
        assert_eq!(parsed["openapi"], "3.0.0");
        assert_eq!(parsed["info"]["title"], "Test API");
        assert!(parsed.get("paths").is_some());
    }

    #[tokio::test]
    async fn test_swagger_ui_embeds_spec_path() {
        use http_body_util::BodyExt;

        let res = swagger_ui("Test API", "/openapi.json");
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("/openapi.json"));
        assert!(body.contains("swagger-ui"));
    }
}
