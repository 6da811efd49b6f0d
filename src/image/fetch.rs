use super::{ImageInput, ImageMime, MAX_IMAGE_BYTES};
use crate::{Error, Result};
use reqwest::Client;

/// Downloads an image by URL, applying the same checks as direct uploads.
pub struct ImageFetcher {
    client: Client,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<ImageInput> {
        tracing::debug!("Fetching image from {}", url);

        let mut response = self.client.get(url).send().await.map_err(|e| {
            tracing::error!("Failed to fetch image from {}: {}", url, e);
            e
        })?;

        if !response.status().is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            let length = length as usize;
            if length > self.max_bytes {
                return Err(Error::ImageTooLarge {
                    size: length,
                    limit: self.max_bytes,
                });
            }
        }

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(ImageMime::parse);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(Error::ImageTooLarge {
                    size: bytes.len() + chunk.len(),
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(Error::EmptyImage);
        }

        // The body must be an image even when the header says so.
        let input = match (declared, ImageMime::sniff(&bytes)) {
            (_, None) => {
                return Err(Error::UnsupportedMediaType(format!(
                    "body from {} is not a recognised image",
                    url
                )))
            }
            (Some(declared), Some(sniffed)) if declared != sniffed => {
                return Err(Error::UnsupportedMediaType(format!(
                    "{} declared {} but body is {}",
                    url, declared, sniffed
                )))
            }
            (_, Some(sniffed)) => ImageInput::with_mime(bytes, sniffed)?,
        };

        tracing::info!(
            "Fetched {} ({} bytes) from {}",
            input.mime(),
            input.len(),
            url
        );

        Ok(input.with_source_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::test_images;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_uses_declared_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(test_images::PNG),
            )
            .mount(&server)
            .await;

        let url = format!("{}/cat.png", server.uri());
        let input = ImageFetcher::new(Client::new()).fetch(&url).await.unwrap();

        assert_eq!(input.mime(), ImageMime::Png);
        assert_eq!(input.bytes(), test_images::PNG);
        assert_eq!(input.source_url(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_fetch_sniffs_when_content_type_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(test_images::JPEG),
            )
            .mount(&server)
            .await;

        let input = ImageFetcher::new(Client::new())
            .fetch(&format!("{}/blob", server.uri()))
            .await
            .unwrap();
        assert_eq!(input.mime(), ImageMime::Jpeg);
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_image_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<!DOCTYPE html><html></html>"),
            )
            .mount(&server)
            .await;

        let err = ImageFetcher::new(Client::new())
            .fetch(&server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(&server)
            .await;

        let fetcher = ImageFetcher {
            client: Client::new(),
            max_bytes: 16,
        };
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_fetch_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = ImageFetcher::new(Client::new())
            .fetch(&server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_html_served_as_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"<!DOCTYPE html><html>Not found</html>".to_vec(), "image/png"),
            )
            .mount(&server)
            .await;

        let err = ImageFetcher::new(Client::new())
            .fetch(&server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_mismatched_declared_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(test_images::JPEG, "image/png"))
            .mount(&server)
            .await;

        let err = ImageFetcher::new(Client::new())
            .fetch(&server.uri())
            .await
            .unwrap_err();
        match err {
            Error::UnsupportedMediaType(message) => {
                assert!(message.contains("declared image/png but body is image/jpeg"))
            }
            other => panic!("expected UnsupportedMediaType, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_stops_reading_chunked_body_past_limit() {
        const CHUNK: usize = 64 * 1024;
        const CHUNKS: usize = 64;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nTransfer-Encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let data = vec![0u8; CHUNK];
            for _ in 0..CHUNKS {
                let frame = [format!("{:x}\r\n", CHUNK).as_bytes(), &data, b"\r\n"].concat();
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        let fetcher = ImageFetcher {
            client: Client::new(),
            max_bytes: 16,
        };
        let err = fetcher
            .fetch(&format!("http://{}/big.png", addr))
            .await
            .unwrap_err();

        match err {
            Error::ImageTooLarge { size, limit } => {
                assert_eq!(limit, 16);
                assert!(size < CHUNK * CHUNKS / 2, "read {} bytes before rejecting", size);
            }
            other => panic!("expected ImageTooLarge, got {:?}", other),
        }
    }
}
