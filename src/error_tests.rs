use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
    assert_eq!(AppError::not_implemented("not_implemented", "nope").http_status(), 501);
    assert_eq!(AppError::upstream("upstream", "down").http_status(), 502);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn internal_errors_hide_their_message() {
    let err = AppError::internal("engine", "connection refused to 10.0.0.7:5432");
    assert_eq!(err.public_body(), SERVER_ERROR_CODE);
    assert_eq!(err.message(), "connection refused to 10.0.0.7:5432");

    let user = AppError::user("wrong_prompt", "Interaction prompt type must be `consent`.");
    assert_eq!(user.public_body(), "Interaction prompt type must be `consent`.");
}

#[test]
fn anyhow_maps_to_internal() {
    let err: AppError = anyhow::anyhow!("disk full").into();
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.code_str(), SERVER_ERROR_CODE);
}

#[tokio::test]
async fn into_response_uses_plain_text() {
    use http_body_util::BodyExt;

    let resp = AppError::not_implemented("unsupported_prompt", "Not implemented.").into_response();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Not implemented.");
}
