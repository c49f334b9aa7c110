//! Bucket mapping applied before upstream dispatch.

#[cfg(test)]
mod tests {
    use crate::{emulated_s3_client, signed_by_remote, start_proxy_with_mapping, upstream_path};

    #[tokio::test]
    async fn test_should_forward_alias_bucket_to_mapped_prefix() {
        let mut proxy = start_proxy_with_mapping("reports", "data-lake/teams/finance").await;
        let get = proxy
            .upstream
            .mock("GET", upstream_path("/data-lake/teams/finance/2024/q1.csv"))
            .match_header("authorization", signed_by_remote())
            .with_status(200)
            .with_body("revenue,100")
            .create_async()
            .await;

        let resp = emulated_s3_client(&proxy)
            .get_object()
            .bucket("reports")
            .key("2024/q1.csv")
            .send()
            .await
            .expect("get_object");

        let data = resp.body.collect().await.expect("collect body").into_bytes();
        assert_eq!(data.as_ref(), b"revenue,100");
        get.assert_async().await;
    }
}
