//! Emulated STS role assumption.

#[cfg(test)]
mod tests {
    use crate::{s3_client, signed_by_remote, start_proxy, sts_client, upstream_path};

    #[tokio::test]
    async fn test_should_assume_role_and_use_session_credentials() {
        let mut proxy = start_proxy().await;
        let get = proxy
            .upstream
            .mock("GET", upstream_path("/data/a.txt"))
            .match_header("authorization", signed_by_remote())
            .with_status(200)
            .with_body("a")
            .create_async()
            .await;

        let assumed = sts_client(&proxy)
            .assume_role()
            .role_arn("arn:aws:iam::123456789012:role/reader")
            .role_session_name("integration")
            .duration_seconds(900)
            .send()
            .await
            .expect("assume_role");
        let creds = assumed.credentials().expect("credentials in response");
        let role_user = assumed.assumed_role_user().expect("assumed role user");
        assert!(role_user.arn().contains("assumed-role/reader/integration"));

        let resp = s3_client(
            &proxy.endpoint,
            creds.access_key_id(),
            creds.secret_access_key(),
            Some(creds.session_token().to_owned()),
        )
        .get_object()
        .bucket("data")
        .key("a.txt")
        .send()
        .await
        .expect("get_object with assumed role");

        let data = resp.body.collect().await.expect("collect body").into_bytes();
        assert_eq!(data.as_ref(), b"a");
        get.assert_async().await;
    }
}
