//! The proxy in front of a live S3-compatible endpoint.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aws_sdk_s3::primitives::ByteStream;
    use s3proxy_core::s3::S3Store;
    use s3proxy_core::{HttpOptions, ListingFormat, ObjectStore};

    use crate::{TestProxy, cleanup_bucket, create_test_bucket, http_client, s3_client};

    fn store(client: &aws_sdk_s3::Client, bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(S3Store::new(client.clone(), bucket))
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_get_object_through_proxy() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "proxy-get").await;

        client
            .put_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .body(ByteStream::from_static(b"hello from s3"))
            .content_type("text/plain")
            .send()
            .await
            .expect("put_object");

        let proxy = TestProxy::start(HttpOptions::default(), store(&client, &bucket), None).await;

        let resp = http_client()
            .get(proxy.url("/greeting.txt"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert!(resp.headers().contains_key("last-modified"));
        assert_eq!(resp.text().await.expect("body"), "hello from s3");

        let resp = http_client()
            .get(proxy.url("/greeting.txt"))
            .header("Range", "bytes=0-4")
            .send()
            .await
            .expect("range get");
        assert_eq!(resp.status(), reqwest::StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.text().await.expect("body"), "hello");

        let resp = http_client()
            .get(proxy.url("/missing.txt"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        proxy.stop().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_object_through_proxy() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "proxy-put").await;
        let proxy = TestProxy::start(HttpOptions::default(), store(&client, &bucket), None).await;

        let resp = http_client()
            .put(proxy.url("/uploads/data.json"))
            .header("Content-Type", "application/json")
            .body(r#"{"ok":true}"#)
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        assert!(resp.headers().contains_key("etag"));

        let obj = client
            .get_object()
            .bucket(&bucket)
            .key("uploads/data.json")
            .send()
            .await
            .expect("get_object");
        assert_eq!(obj.content_type(), Some("application/json"));
        let data = obj.body.collect().await.expect("collect body").into_bytes();
        assert_eq!(data.as_ref(), br#"{"ok":true}"#);

        proxy.stop().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_bucket_directory() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "proxy-list").await;
        for key in ["docs/a.txt", "docs/b.txt", "docs/img/logo.png"] {
            client
                .put_object()
                .bucket(&bucket)
                .key(key)
                .body(ByteStream::from_static(b"x"))
                .send()
                .await
                .expect("put_object");
        }

        let options = HttpOptions::builder()
            .directory_listing(true)
            .listing_format(ListingFormat::Json)
            .build();
        let proxy = TestProxy::start(options, store(&client, &bucket), None).await;

        let resp = http_client().get(proxy.url("/docs/")).send().await.expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let names: Vec<String> = serde_json::from_str(&resp.text().await.expect("body")).expect("json");
        assert_eq!(names, vec!["a.txt", "b.txt", "img/"]);

        proxy.stop().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_read_through_between_buckets() {
        let client = s3_client();
        let primary = create_test_bucket(&client, "proxy-primary").await;
        let secondary = create_test_bucket(&client, "proxy-secondary").await;

        client
            .put_object()
            .bucket(&secondary)
            .key("archive/old.txt")
            .body(ByteStream::from_static(b"archived"))
            .send()
            .await
            .expect("put_object");

        let proxy = TestProxy::start(
            HttpOptions::default(),
            store(&client, &primary),
            Some(store(&client, &secondary)),
        )
        .await;

        let resp = http_client()
            .get(proxy.url("/archive/old.txt"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "archived");

        proxy.stop().await;
        cleanup_bucket(&client, &primary).await;
        cleanup_bucket(&client, &secondary).await;
    }
}
