//! `symlink.json` indirection.

#[cfg(test)]
mod tests {
    use s3proxy_core::HttpOptions;

    use crate::{MemoryProxy, http_client};

    #[tokio::test]
    async fn test_should_follow_symlink_to_target() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary
            .insert_bytes("releases/latest/symlink.json", r#"{"URL":"/releases/v1.4.2"}"#);
        env.primary.insert_bytes("releases/v1.4.2/app.tar.gz", "tarball");

        let resp = http_client()
            .get(env.url("/releases/latest/symlink.json/app.tar.gz"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "tarball");
    }

    #[tokio::test]
    async fn test_should_not_follow_second_symlink() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary.insert_bytes("a/symlink.json", r#"{"URL":"/b/symlink.json"}"#);
        env.primary.insert_bytes("b/symlink.json", r#"{"URL":"/c"}"#);
        env.primary.insert_bytes("c/file", "never served");

        let resp = http_client()
            .get(env.url("/a/symlink.json/file"))
            .send()
            .await
            .expect("get");
        assert!(resp.status().is_server_error());
        assert_eq!(env.primary.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_should_fail_on_malformed_symlink() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;
        env.primary.insert_bytes("a/symlink.json", "<not json>");

        let resp = http_client()
            .get(env.url("/a/symlink.json/file"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_should_return_404_for_missing_symlink() {
        let env = MemoryProxy::start(HttpOptions::default(), false).await;

        let resp = http_client()
            .get(env.url("/a/symlink.json/file"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
