use actix_multipart::Multipart;
use actix_web::{error::QueryPayloadError, http::StatusCode, web, HttpResponse};
use serde::{Deserialize, Serialize};

use scanrelay_core::{ErrorKind, Finding, ScanError, ScanRequest, ScanResult};

use super::upload::receive_upload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub analyzer: Option<String>,
    pub depth: Option<u32>,
}

#[derive(Serialize)]
struct ScanSuccess<'a> {
    success: bool,
    issues: &'a [Finding],
}

#[derive(Serialize)]
struct ScanFailure<'a> {
    success: bool,
    error: ErrorKind,
    detail: &'a str,
}

/// POST /file：上传一个文件，运行分析器并返回结果
pub async fn scan_file(
    state: web::Data<AppState>,
    query: web::Query<ScanQuery>,
    payload: Multipart,
) -> HttpResponse {
    let result = scan_upload(&state, query.into_inner(), payload).await;
    scan_response(&result)
}

async fn scan_upload(state: &AppState, query: ScanQuery, payload: Multipart) -> ScanResult {
    let analyzer = match state.registry.resolve(query.analyzer.as_deref()) {
        Ok(analyzer) => analyzer,
        Err(e) => return e.into(),
    };

    let max_depth = match resolve_depth(query.depth, state) {
        Ok(depth) => depth,
        Err(e) => return e.into(),
    };

    let upload = match receive_upload(&state.store, payload).await {
        Ok(upload) => upload,
        Err(e) => {
            tracing::warn!("Upload rejected ({}): {}", e.kind(), e);
            return e.into();
        }
    };

    let request = ScanRequest::from_upload(upload, max_depth);
    state.orchestrator.run_scan(analyzer.as_ref(), request).await
}

fn resolve_depth(depth: Option<u32>, state: &AppState) -> Result<u32, ScanError> {
    match depth {
        None => Ok(state.default_max_depth),
        Some(depth) if (1..=state.max_depth_limit).contains(&depth) => Ok(depth),
        Some(depth) => Err(ScanError::InvalidInput(format!(
            "depth {} is outside 1..={}",
            depth, state.max_depth_limit
        ))),
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidUpload | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::StorageError | ErrorKind::LaunchError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::AnalyzerError | ErrorKind::MalformedOutput => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

pub fn scan_response(result: &ScanResult) -> HttpResponse {
    match result {
        ScanResult::Success { findings } => HttpResponse::Ok().json(ScanSuccess {
            success: true,
            issues: findings,
        }),
        ScanResult::Failure { reason, detail } => {
            HttpResponse::build(status_for(*reason)).json(ScanFailure {
                success: false,
                error: *reason,
                detail,
            })
        }
    }
}

pub(crate) fn query_error_response(err: &QueryPayloadError) -> HttpResponse {
    scan_response(&ScanResult::failure(ErrorKind::InvalidInput, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::config::AppConfig;
    use actix_web::{http::header, test, App};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    const BOUNDARY: &str = "scanrelay-test-boundary";

    struct Harness {
        dir: TempDir,
        config: AppConfig,
        /// 启动后删除临时存储目录，模拟磁盘不可写
        remove_scratch_dir: bool,
    }

    impl Harness {
        /// 用 shell 脚本模拟 mythril
        fn with_script(body: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("myth.sh");
            std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();

            let mut config = AppConfig::from_lookup(|_| None).unwrap();
            config.scratch_dir = dir.path().join("contracts");
            config.mythril_command = vec!["sh".to_string(), script.display().to_string()];
            Self {
                dir,
                config,
                remove_scratch_dir: false,
            }
        }

        fn scratch_dir(&self) -> &Path {
            &self.config.scratch_dir
        }

        async fn post(&self, uri: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
            let state = AppState::new(&self.config).unwrap();
            if self.remove_scratch_dir {
                std::fs::remove_dir_all(self.scratch_dir()).unwrap();
            }
            let app = test::init_service(
                App::new()
                    .app_data(web::Data::new(state))
                    .configure(configure_routes),
            )
            .await;

            let req = test::TestRequest::post()
                .uri(uri)
                .insert_header((
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                ))
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            let status = resp.status();
            let body: serde_json::Value = test::read_body_json(resp).await;
            (status, body)
        }
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body.into_bytes()
    }

    fn contract_upload() -> Vec<u8> {
        multipart_body(&[("text", Some("contract.sol"), "pragma solidity ^0.4.24;\ncontract C {}\n")])
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[actix_web::test]
    async fn test_upload_scan_success() {
        let harness = Harness::with_script(
            r#"echo '{"issues":[{"type":"Reentrancy","title":"External call","filename":"contract.sol","lineno":42,"description":"State change after external call"}]}'"#,
        );

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let issues = body["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["type"], "Reentrancy");
        assert_eq!(issues[0]["lineno"], 42);
        assert!(scratch_is_empty(harness.scratch_dir()));
    }

    #[actix_web::test]
    async fn test_depth_passed_to_analyzer() {
        let harness = Harness::with_script("");
        let args_file = harness.dir.path().join("args.txt");
        let script = harness.dir.path().join("myth.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\necho '{{\"issues\":[]}}'\n",
                args_file.display()
            ),
        )
        .unwrap();

        let (status, body) = harness.post("/file?depth=3", contract_upload()).await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        let args = std::fs::read_to_string(&args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[4..], ["--max-depth", "3"]);
        assert!(args[1].ends_with(".sol"));
        assert!(!args[1].contains("contract.sol"));
    }

    #[actix_web::test]
    async fn test_no_file_field_is_invalid_upload() {
        let harness = Harness::with_script("exit 0");
        let body = multipart_body(&[("name", None, "contract.sol")]);

        let (status, body) = harness.post("/file", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "InvalidUpload");
    }

    #[actix_web::test]
    async fn test_empty_filename_is_not_a_file() {
        let harness = Harness::with_script("exit 0");
        let body = multipart_body(&[("text", Some(""), "")]);

        let (status, body) = harness.post("/file", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidUpload");
    }

    #[actix_web::test]
    async fn test_two_files_rejected() {
        let harness = Harness::with_script("exit 0");
        let body = multipart_body(&[
            ("a", Some("a.sol"), "contract A {}"),
            ("b", Some("b.sol"), "contract B {}"),
        ]);

        let (status, body) = harness.post("/file", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidUpload");
        assert!(scratch_is_empty(harness.scratch_dir()));
    }

    #[actix_web::test]
    async fn test_upload_over_limit() {
        let mut harness = Harness::with_script("exit 0");
        harness.config.max_upload_bytes = 8;

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidUpload");
        assert!(scratch_is_empty(harness.scratch_dir()));
    }

    #[actix_web::test]
    async fn test_unwritable_scratch_is_storage_error() {
        let mut harness = Harness::with_script("echo '{\"issues\":[]}'");
        harness.remove_scratch_dir = true;

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "StorageError");
    }

    #[actix_web::test]
    async fn test_detail_does_not_expose_scratch_path() {
        let harness = Harness::with_script("echo \"$2: ParserError\" >&2\nexit 1");

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["detail"], "contract.sol: ParserError");
    }

    #[actix_web::test]
    async fn test_missing_binary_is_launch_error() {
        let mut harness = Harness::with_script("exit 0");
        harness.config.mythril_command = vec!["scanrelay-no-such-analyzer-binary".to_string()];

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "LaunchError");
        assert!(scratch_is_empty(harness.scratch_dir()));
    }

    #[actix_web::test]
    async fn test_analyzer_failure_is_bad_gateway() {
        let harness = Harness::with_script("echo 'solc not found' >&2\nexit 1");

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "AnalyzerError");
        assert_eq!(body["detail"], "solc not found");
    }

    #[actix_web::test]
    async fn test_timeout_is_gateway_timeout() {
        let mut harness = Harness::with_script("sleep 30");
        harness.config.scan_timeout = Duration::from_secs(1);

        let (status, body) = harness.post("/file", contract_upload()).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Timeout");
        assert!(scratch_is_empty(harness.scratch_dir()));
    }

    #[actix_web::test]
    async fn test_unknown_analyzer_and_bad_depth() {
        let harness = Harness::with_script("exit 0");

        let (status, body) = harness.post("/file?analyzer=slither", contract_upload()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidInput");

        let (status, body) = harness.post("/file?depth=1000", contract_upload()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidInput");

        let (status, body) = harness.post("/file?depth=deep", contract_upload()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidInput");
    }

    #[actix_web::test]
    async fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidUpload), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::StorageError), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::LaunchError), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::MalformedOutput), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }
}
