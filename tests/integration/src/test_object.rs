//! Object GET/HEAD/PUT over real HTTP.

#[cfg(test)]
mod tests {
    use s3proxy_core::HttpOptions;
    use s3proxy_core::memory::MemoryObject;

    use crate::{MemoryProxy, http_client};

    #[tokio::test]
    async fn test_should_get_object_with_metadata() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        let mut obj = MemoryObject::new("hello, proxy!");
        obj.content_type = Some("text/plain".to_owned());
        obj.cache_control = Some("no-cache".to_owned());
        env.primary.insert("greeting.txt", obj);

        let resp = http_client()
            .get(env.url("/greeting.txt"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert_eq!(
            resp.headers().get("cache-control").and_then(|v| v.to_str().ok()),
            Some("no-cache")
        );
        assert!(resp.headers().contains_key("etag"));
        assert!(resp.headers().contains_key("x-request-id"));
        assert_eq!(resp.text().await.expect("body"), "hello, proxy!");

        assert!(env.proxy.stop().await);
    }

    #[tokio::test]
    async fn test_should_apply_header_overrides() {
        let options = HttpOptions::builder()
            .cache_control("public, max-age=300".into())
            .facility("edge-eu".into())
            .build();
        let env = MemoryProxy::start(options, false).await;
        let mut obj = MemoryObject::new("x");
        obj.cache_control = Some("no-cache".to_owned());
        env.primary.insert("a.txt", obj);

        let resp = http_client().get(env.url("/a.txt")).send().await.expect("get");
        assert_eq!(
            resp.headers().get("cache-control").and_then(|v| v.to_str().ok()),
            Some("public, max-age=300")
        );
        assert_eq!(
            resp.headers().get("facility").and_then(|v| v.to_str().ok()),
            Some("edge-eu")
        );
    }

    #[tokio::test]
    async fn test_should_serve_range_as_partial_content() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary.insert_bytes("data.bin", "0123456789");

        let resp = http_client()
            .get(env.url("/data.bin"))
            .header("Range", "bytes=3-6")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            resp.headers().get("content-range").and_then(|v| v.to_str().ok()),
            Some("bytes 3-6/10")
        );
        assert_eq!(resp.text().await.expect("body"), "3456");
    }

    #[tokio::test]
    async fn test_should_reject_unsatisfiable_range() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary.insert_bytes("data.bin", "0123");

        let resp = http_client()
            .get(env.url("/data.bin"))
            .header("Range", "bytes=10-20")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn test_should_head_object_without_body() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary.insert_bytes("a.txt", "hello");

        let resp = http_client().head(env.url("/a.txt")).send().await.expect("head");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-length").and_then(|v| v.to_str().ok()),
            Some("5")
        );
        assert!(resp.bytes().await.expect("body").is_empty());
    }

    #[tokio::test]
    async fn test_should_return_plain_text_404() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;

        let resp = http_client().get(env.url("/nope.txt")).send().await.expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );
        assert!(resp.text().await.expect("body").contains("nope.txt"));
    }

    #[tokio::test]
    async fn test_should_strip_path_and_prefix_keys() {
        let options = HttpOptions::builder()
            .strip_path("/cdn".into())
            .key_prefix("public".into())
            .build();
        let env = MemoryProxy::start(options, false).await;
        env.primary.insert_bytes("public/js/app.js", "console.log(1)");

        let resp = http_client()
            .get(env.url("/cdn/js/app.js"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "console.log(1)");
    }

    #[tokio::test]
    async fn test_should_put_object_to_primary() {
        let env = MemoryProxy::start(HttpOptions::default(), true).await;

        let resp = http_client()
            .put(env.url("/uploads/report.csv"))
            .header("Content-Type", "text/csv")
            .body("a,b\n1,2\n")
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        assert!(resp.headers().contains_key("etag"));

        let stored = env.primary.object("uploads/report.csv").expect("stored");
        assert_eq!(stored.data.as_ref(), b"a,b\n1,2\n");
        assert_eq!(stored.content_type.as_deref(), Some("text/csv"));
        assert_eq!(env.secondary.put_calls(), 0);

        let resp = http_client()
            .get(env.url("/uploads/report.csv"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.text().await.expect("body"), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_should_reject_unsupported_methods() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;

        let resp = http_client()
            .delete(env.url("/a.txt"))
            .send()
            .await
            .expect("delete");
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_should_answer_health_checks() {
        let options = HttpOptions::builder()
            .strip_path("/site".into())
            .health_check_path("/healthz".into())
            .facility("dc-1".into())
            .build();
        let env = MemoryProxy::start(options, false).await;
        let client = http_client();

        for path in ["/_health", "/site/healthz"] {
            let resp = client.get(env.url(path)).send().await.expect("get");
            assert_eq!(resp.status(), reqwest::StatusCode::OK, "{path}");
            assert_eq!(
                resp.headers().get("facility").and_then(|v| v.to_str().ok()),
                Some("dc-1")
            );
        }
        assert_eq!(env.primary.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_reach_keys_that_need_encoding() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary.insert_bytes("reports/q1 2024 #final.csv", "a,b");

        let resp = http_client()
            .get(env.url("/reports/q1%202024%20%23final.csv"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "a,b");

        let resp = http_client()
            .put(env.url("/uploads/na%C3%AFve.txt"))
            .body("naive")
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        assert!(env.primary.object("uploads/na\u{ef}ve.txt").is_some());
    }
}
