//! Object requests forwarded through the proxy.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::ByteStream;
    use mockito::Matcher;

    use crate::{emulated_s3_client, signed_by_remote, start_proxy, upstream_path};

    #[tokio::test]
    async fn test_should_put_and_get_object_through_proxy() {
        let mut proxy = start_proxy().await;
        let put = proxy
            .upstream
            .mock("PUT", upstream_path("/data/greeting.txt"))
            .match_header("authorization", signed_by_remote())
            .match_header("content-type", "text/plain")
            .match_body("hello, s3proxy!")
            .with_status(200)
            .with_header("etag", "\"5d41402abc4b2a76b9719d911017c592\"")
            .create_async()
            .await;
        let get = proxy
            .upstream
            .mock("GET", upstream_path("/data/greeting.txt"))
            .match_header("authorization", signed_by_remote())
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("hello, s3proxy!")
            .create_async()
            .await;

        let client = emulated_s3_client(&proxy);
        client
            .put_object()
            .bucket("data")
            .key("greeting.txt")
            .body(ByteStream::from_static(b"hello, s3proxy!"))
            .content_type("text/plain")
            .send()
            .await
            .expect("put_object");

        let resp = client
            .get_object()
            .bucket("data")
            .key("greeting.txt")
            .send()
            .await
            .expect("get_object");
        assert_eq!(resp.content_type(), Some("text/plain"));
        let data = resp.body.collect().await.expect("collect body").into_bytes();
        assert_eq!(data.as_ref(), b"hello, s3proxy!");

        put.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_should_list_objects_through_proxy() {
        let mut proxy = start_proxy().await;
        let list = proxy
            .upstream
            .mock("GET", Matcher::Regex("^/listing".to_owned()))
            .match_query(Matcher::UrlEncoded("list-type".to_owned(), "2".to_owned()))
            .match_header("authorization", signed_by_remote())
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>listing</Name>
  <Prefix></Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>a.txt</Key><Size>1</Size></Contents>
  <Contents><Key>b/c.txt</Key><Size>2</Size></Contents>
</ListBucketResult>"#,
            )
            .create_async()
            .await;

        let resp = emulated_s3_client(&proxy)
            .list_objects_v2()
            .bucket("listing")
            .send()
            .await
            .expect("list_objects_v2");

        let keys: Vec<&str> = resp.contents().iter().filter_map(|o| o.key()).collect();
        assert_eq!(keys, vec!["a.txt", "b/c.txt"]);
        list.assert_async().await;
    }
}
