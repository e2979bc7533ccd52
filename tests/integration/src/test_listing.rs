//! Directory listings and index documents.

#[cfg(test)]
mod tests {
    use s3proxy_core::memory::MemoryObject;
    use s3proxy_core::{HttpOptions, ListingFormat};

    use crate::{MemoryProxy, http_client};

    fn listing_options(format: ListingFormat) -> HttpOptions {
        HttpOptions::builder()
            .directory_listing(true)
            .listing_format(format)
            .build()
    }

    #[tokio::test]
    async fn test_should_list_directory_as_json() {
        let env = MemoryProxy::start(listing_options(ListingFormat::Json), false).await;
        env.primary.insert_bytes("docs/b.txt", "b");
        env.primary.insert_bytes("docs/a.txt", "a");
        env.primary.insert_bytes("docs/img/logo.png", "png");
        env.primary.insert_bytes("other/c.txt", "c");

        let resp = http_client().get(env.url("/docs/")).send().await.expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/json; charset=utf-8")
        );

        let names: Vec<String> = serde_json::from_str(&resp.text().await.expect("body")).expect("json");
        assert_eq!(names, vec!["a.txt", "b.txt", "img/"]);
    }

    #[tokio::test]
    async fn test_should_list_directory_as_html() {
        let env = MemoryProxy::start(listing_options(ListingFormat::Html), false).await;
        env.primary.insert_bytes("docs/a.txt", "a");
        env.primary.insert_bytes("docs/img/logo.png", "png");

        let resp = http_client().get(env.url("/docs/")).send().await.expect("get");
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/html; charset=utf-8")
        );
        let html = resp.text().await.expect("body");
        assert!(html.starts_with("<!DOCTYPE html><html><body><ul>"));
        assert!(html.contains("<li><a href=\"img/\">img/</a></li>"));
        assert!(html.contains("<a href=\"a.txt\">a.txt</a>"));
    }

    #[tokio::test]
    async fn test_should_list_under_key_prefix() {
        let options = HttpOptions::builder()
            .directory_listing(true)
            .listing_format(ListingFormat::Json)
            .key_prefix("site".into())
            .build();
        let env = MemoryProxy::start(options, false).await;
        env.primary.insert_bytes("site/x/1.txt", "1");
        env.primary.insert_bytes("x/2.txt", "2");

        let resp = http_client().get(env.url("/x/")).send().await.expect("get");
        assert_eq!(resp.text().await.expect("body"), "[\"1.txt\"]\n");
    }

    #[tokio::test]
    async fn test_should_serve_index_document_when_listing_disabled() {
        let options = HttpOptions::builder().index_document("default.htm".into()).build();
        let env = MemoryProxy::start(options, false).await;
        let mut index = MemoryObject::new("<p>welcome</p>");
        index.content_type = Some("text/html".to_owned());
        env.primary.insert("docs/default.htm", index);

        let resp = http_client().get(env.url("/docs/")).send().await.expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "<p>welcome</p>");
        assert_eq!(env.primary.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_return_empty_listing_for_unknown_directory() {
        let env = MemoryProxy::start(listing_options(ListingFormat::Json), false).await;

        let resp = http_client().get(env.url("/ghost/")).send().await.expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "[]\n");
    }
}
