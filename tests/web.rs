//! HTTP behaviour of the submission form.

mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use common::{pipeline, FakeExtractor, FakeSheets, FakeStorage};
use pdf2sheet::web::{router, AppState};
use pdf2sheet::WorksheetAllowList;
use std::sync::Arc;

const MAX_UPLOAD: usize = 1024 * 1024;

struct Harness {
    server: TestServer,
    storage: Arc<FakeStorage>,
    sheets: Arc<FakeSheets>,
}

fn harness(images: usize, storage: FakeStorage) -> Harness {
    let storage = Arc::new(storage);
    let sheets = Arc::new(FakeSheets::with_worksheets(&["bulco", "martin", "O'Brien"]));
    let state = AppState::new(
        pipeline(FakeExtractor::with_images(images), storage.clone(), sheets.clone()),
        WorksheetAllowList::parse("bulco,martin,O'Brien"),
    );
    let server = TestServer::new(router(state, MAX_UPLOAD)).unwrap();
    Harness {
        server,
        storage,
        sheets,
    }
}

fn pdf_part(name: &str, bytes: &'static [u8]) -> Part {
    Part::bytes(bytes)
        .file_name(name)
        .mime_type("application/pdf")
}

#[tokio::test]
async fn health_answers_ok() {
    let h = harness(0, FakeStorage::default());
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn form_lists_allowed_worksheets() {
    let h = harness(0, FakeStorage::default());
    let response = h.server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("name=\"pdf_file\""));
    assert!(html.contains("name=\"sheet_name\""));
    assert!(html.contains(">bulco<"));
    assert!(html.contains(">martin<"));
    assert!(html.contains("O&#39;Brien"), "titles are escaped");
}

#[tokio::test]
async fn successful_submission_redirects_to_success_page() {
    let h = harness(2, FakeStorage::default());
    let form = MultipartForm::new()
        .add_text("sheet_name", "bulco")
        .add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));

    let response = h.server.post("/").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/success/bulco");
    assert_eq!(h.sheets.calls_for("bulco").len(), 4);

    let page = h.server.get("/success/bulco").await;
    page.assert_status_ok();
    assert!(page.text().contains("bulco"));
}

#[tokio::test]
async fn worksheet_name_is_encoded_in_the_redirect() {
    let h = harness(1, FakeStorage::default());
    let form = MultipartForm::new()
        .add_text("sheet_name", "O'Brien")
        .add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));

    let response = h.server.post("/").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/success/O%27Brien");
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let h = harness(1, FakeStorage::default());
    let form = MultipartForm::new()
        .add_text("sheet_name", "bulco")
        .add_part(
            "pdf_file",
            Part::bytes(b"hello".as_slice())
                .file_name("notes.txt")
                .mime_type("text/plain"),
        );

    let response = h.server.post("/").multipart(form).await;

    response.assert_status_bad_request();
    assert!(response.text().contains("please upload a PDF"));
    assert!(h.storage.state().created.is_empty());
}

#[tokio::test]
async fn pdf_name_with_wrong_content_is_rejected() {
    let h = harness(1, FakeStorage::default());
    let form = MultipartForm::new()
        .add_text("sheet_name", "bulco")
        .add_part("pdf_file", pdf_part("form.pdf", b"PK\x03\x04zip"));

    let response = h.server.post("/").multipart(form).await;

    response.assert_status_bad_request();
    assert!(h.sheets.state().calls.is_empty());
}

#[tokio::test]
async fn missing_file_or_worksheet_is_rejected() {
    let h = harness(1, FakeStorage::default());

    let no_file = MultipartForm::new().add_text("sheet_name", "bulco");
    h.server
        .post("/")
        .multipart(no_file)
        .await
        .assert_status_bad_request();

    let no_sheet =
        MultipartForm::new().add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));
    h.server
        .post("/")
        .multipart(no_sheet)
        .await
        .assert_status_bad_request();

    let blank_sheet = MultipartForm::new()
        .add_text("sheet_name", "   ")
        .add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));
    h.server
        .post("/")
        .multipart(blank_sheet)
        .await
        .assert_status_bad_request();

    assert!(h.sheets.state().calls.is_empty());
}

#[tokio::test]
async fn worksheet_outside_the_list_is_rejected() {
    let h = harness(1, FakeStorage::default());
    let form = MultipartForm::new()
        .add_text("sheet_name", "someone-else")
        .add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));

    let response = h.server.post("/").multipart(form).await;

    response.assert_status_bad_request();
    assert!(response.text().contains("someone-else"));
    assert!(h.storage.state().created.is_empty());
}

#[tokio::test]
async fn lost_upload_shows_partial_page() {
    let h = harness(2, FakeStorage::failing_create("image_2.png", 3));
    let form = MultipartForm::new()
        .add_text("sheet_name", "martin")
        .add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));

    let response = h.server.post("/").multipart(form).await;

    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("image_2.png"), "{html}");
    assert_eq!(h.sheets.calls_for("martin").len(), 3, "one row: range, formula, LOGO");
}

#[tokio::test]
async fn sheet_failure_is_a_server_error() {
    let h = harness(1, FakeStorage::default());
    h.sheets.state().rate_limited = 10;
    let form = MultipartForm::new()
        .add_text("sheet_name", "bulco")
        .add_part("pdf_file", pdf_part("form.pdf", b"%PDF-1.4\n"));

    let response = h.server.post("/").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("rate-limiting"));
}
