//! Error responses produced by the proxy and relayed from upstream.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::error::ProvideErrorMetadata;

    use crate::{EMULATED_ACCESS_KEY, emulated_s3_client, s3_client, start_proxy, upstream_path};

    #[tokio::test]
    async fn test_should_relay_upstream_no_such_key() {
        let mut proxy = start_proxy().await;
        let _missing = proxy
            .upstream
            .mock("GET", upstream_path("/data/missing.txt"))
            .with_status(404)
            .with_header("content-type", "application/xml")
            .with_body(
                "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
            )
            .create_async()
            .await;

        let err = emulated_s3_client(&proxy)
            .get_object()
            .bucket("data")
            .key("missing.txt")
            .send()
            .await
            .expect_err("missing object should fail");

        assert!(err.into_service_error().is_no_such_key());
    }

    #[tokio::test]
    async fn test_should_reject_unknown_access_key() {
        let mut proxy = start_proxy().await;
        let never = proxy
            .upstream
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = s3_client(&proxy.endpoint, "UNKNOWNKEY", "whatever", None)
            .get_object()
            .bucket("data")
            .key("a.txt")
            .send()
            .await
            .expect_err("unknown key should fail");

        assert_eq!(err.code(), Some("InvalidAccessKeyId"));
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_should_reject_wrong_secret() {
        let proxy = start_proxy().await;

        let err = s3_client(&proxy.endpoint, EMULATED_ACCESS_KEY, "not-the-secret", None)
            .put_object()
            .bucket("data")
            .key("a.txt")
            .send()
            .await
            .expect_err("bad signature should fail");

        assert_eq!(err.code(), Some("SignatureDoesNotMatch"));
    }
}
