use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header::{CONTENT_TYPE, HeaderMap};
use actix_web::{HttpRequest, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::info;
use shared::{PredictRequest, StatusResponse};
use std::collections::HashMap;

use crate::analysis::{AnalysisRequest, AnalysisSystem, decode_base64_image};
use crate::error::AnalysisError;

/// Maximum accepted request body, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(status)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/analyze").route(web::post().to(analyze)));
}

async fn status() -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        message: "Dermascan server is running".to_string(),
    })
}

fn upload_error(e: MultipartError) -> AnalysisError {
    AnalysisError::Upload(e.to_string())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("multipart/form-data"))
}

/// Drains every multipart field into memory, keyed by field name. The
/// running total across fields is capped at `limit`.
async fn read_fields(
    mut payload: Multipart,
    limit: usize,
) -> Result<HashMap<String, Vec<u8>>, AnalysisError> {
    let mut fields = HashMap::new();
    let mut total = 0usize;

    while let Some(mut field) = payload.try_next().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(upload_error)? {
            total += chunk.len();
            if total > limit {
                return Err(AnalysisError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        fields.insert(name, data);
    }
    Ok(fields)
}

async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Vec<u8>, AnalysisError> {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| AnalysisError::Upload(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(AnalysisError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn take_text(
    fields: &mut HashMap<String, Vec<u8>>,
    name: &'static str,
) -> Result<String, AnalysisError> {
    let bytes = fields.remove(name).ok_or(AnalysisError::MissingField(name))?;
    String::from_utf8(bytes)
        .map_err(|_| AnalysisError::Upload(format!("{} is not valid UTF-8", name)))
}

/// Runs CPU-bound pipeline work off the async workers.
async fn run_blocking<T, F>(job: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    T: Send + 'static,
{
    web::block(job)
        .await
        .map_err(|e| AnalysisError::Blocking(e.to_string()))?
}

/// `{"image": <base64>}` as JSON, or a multipart upload in `image` or `file`.
async fn predict(
    req: HttpRequest,
    payload: web::Payload,
    system: web::Data<AnalysisSystem>,
    limit: web::Data<UploadLimit>,
) -> Result<HttpResponse, AnalysisError> {
    let image = if is_multipart(req.headers()) {
        let mut fields = read_fields(Multipart::new(req.headers(), payload), limit.0).await?;
        fields
            .remove("image")
            .or_else(|| fields.remove("file"))
            .ok_or(AnalysisError::MissingField("image"))?
    } else {
        let body = read_body(payload, limit.0).await?;
        let request: PredictRequest =
            serde_json::from_slice(&body).map_err(|e| AnalysisError::json("body", e))?;
        decode_base64_image(&request.image)?
    };

    let system = system.into_inner();
    let response = run_blocking(move || system.predict(&image)).await?;
    info!("Predicted {} detections", response.detections.len());
    Ok(HttpResponse::Ok().json(response))
}

/// Multipart `image`, `patient_info` and `factors`.
async fn analyze(
    payload: Multipart,
    system: web::Data<AnalysisSystem>,
    limit: web::Data<UploadLimit>,
) -> Result<HttpResponse, AnalysisError> {
    let mut fields = read_fields(payload, limit.0).await?;
    let image = fields
        .remove("image")
        .ok_or(AnalysisError::MissingField("image"))?;
    let patient_info = take_text(&mut fields, "patient_info")?;
    let factors = take_text(&mut fields, "factors")?;
    let request = AnalysisRequest::from_parts(image, &patient_info, &factors)?;

    let system = system.into_inner();
    let response = run_blocking(move || system.analyze(request)).await?;
    info!(
        "Analyzed {} detections: {} / {}",
        response.detections.len(),
        response.acne_type,
        response.severity
    );
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{png, system};
    use crate::inference::testing::raw;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use shared::{AnalyzeResponse, ErrorResponse, PredictResponse};

    const BOUNDARY: &str = "dermascan-test-boundary";

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(multipart_body(parts))
    }

    macro_rules! app {
        ($detections:expr, $limit:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(system($detections, false)))
                    .app_data(web::Data::new(UploadLimit($limit)))
                    .configure(configure_routes),
            )
            .await
        };
    }

    const PATIENT: &[u8] = br#"{"name": "Ana", "age": 17, "sex": 1}"#;
    const FACTORS: &[u8] =
        br#"[{"name": "stress_level", "value": 9}, {"name": "skin_type", "value": 3}]"#;

    #[actix_web::test]
    async fn root_reports_status() {
        let app = app!(Vec::new(), 1024);
        let request = test::TestRequest::get().uri("/").to_request();
        let response: StatusResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response.message, "Dermascan server is running");
    }

    #[actix_web::test]
    async fn predict_accepts_base64_json() {
        let app = app!(vec![raw(4.0, 4.0, 14.0, 12.0, 0.77, 0)], 1 << 20);
        let body = serde_json::json!({
            "image": format!("data:image/png;base64,{}", STANDARD.encode(png(32, 24)))
        });
        let request = test::TestRequest::post().uri("/predict").set_json(body).to_request();
        let response: PredictResponse = test::call_and_read_body_json(&app, request).await;

        assert_eq!(response.detections.len(), 1);
        assert_eq!(response.detections[0].class_name, "Acné Comedonal");
        let jpeg = STANDARD.decode(&response.image).unwrap();
        assert_eq!(image::load_from_memory(&jpeg).unwrap().to_rgb8().dimensions(), (32, 24));
    }

    #[actix_web::test]
    async fn predict_accepts_file_uploads() {
        let app = app!(Vec::new(), 1 << 20);
        let image = png(16, 16);
        let request =
            multipart_request("/predict", &[("file", Some("face.png"), image.as_slice())])
                .to_request();
        let response: PredictResponse = test::call_and_read_body_json(&app, request).await;
        assert!(response.detections.is_empty());
    }

    #[actix_web::test]
    async fn predict_rejects_bad_base64() {
        let app = app!(Vec::new(), 1 << 20);
        let request = test::TestRequest::post()
            .uri("/predict")
            .set_json(serde_json::json!({ "image": "%%%" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = test::read_body_json(response).await;
        assert!(error.detail.starts_with("Invalid base64 image"));
    }

    #[actix_web::test]
    async fn oversized_uploads_are_rejected() {
        let app = app!(Vec::new(), 64);
        let image = png(32, 32);
        let request =
            multipart_request("/predict", &[("image", Some("face.png"), image.as_slice())])
                .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn analyze_returns_report_and_classification() {
        let app = app!(vec![raw(2.0, 2.0, 10.0, 10.0, 0.9, 1)], 1 << 20);
        let image = png(40, 30);
        let request = multipart_request(
            "/analyze",
            &[
                ("image", Some("face.png"), image.as_slice()),
                ("patient_info", None, PATIENT),
                ("factors", None, FACTORS),
            ],
        )
        .to_request();
        let response: AnalyzeResponse = test::call_and_read_body_json(&app, request).await;

        assert_eq!(response.acne_type, "Acné Vulgar");
        assert!(response.factor_analysis.contains_key("Acné Inflamatorio"));
        assert!(response.recommendations.iter().any(|r| r.contains("estrés")));
        assert!(response.recommendations.iter().any(|r| r.contains("no comedogénicos")));
        let pdf = STANDARD.decode(&response.pdf_report).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        let jpeg = STANDARD.decode(&response.image).unwrap();
        assert_eq!(image::load_from_memory(&jpeg).unwrap().to_rgb8().dimensions(), (40, 30));
    }

    #[actix_web::test]
    async fn analyze_rejects_unknown_factors() {
        let app = app!(Vec::new(), 1 << 20);
        let image = png(8, 8);
        let request = multipart_request(
            "/analyze",
            &[
                ("image", Some("face.png"), image.as_slice()),
                ("patient_info", None, PATIENT),
                ("factors", None, &br#"[{"name": "sleep_hours", "value": 4}]"#[..]),
            ],
        )
        .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = test::read_body_json(response).await;
        assert_eq!(error.detail, "Invalid factors: Unknown factor: sleep_hours");
    }

    #[actix_web::test]
    async fn analyze_requires_patient_info() {
        let app = app!(Vec::new(), 1 << 20);
        let image = png(8, 8);
        let request = multipart_request(
            "/analyze",
            &[("image", Some("face.png"), image.as_slice()), ("factors", None, FACTORS)],
        )
        .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = test::read_body_json(response).await;
        assert_eq!(error.detail, "Missing field: patient_info");
    }
}
