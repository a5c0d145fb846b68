//! Common test utilities for E2E tests

use chrono::Utc;
use clipstream::auth::password;
use clipstream::data::{EntityId, Subscription, User, Video};
use clipstream::{config, AppState};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            storage: config::StorageConfig {
                media: config::MediaStorageConfig {
                    bucket: "test-media".to_string(),
                    public_url: "https://media.test.example.com".to_string(),
                },
            },
            cloudflare: config::CloudflareConfig {
                account_id: "test-account".to_string(),
                r2_access_key_id: "test-key".to_string(),
                r2_secret_access_key: "test-secret".to_string(),
            },
            auth: config::AuthConfig {
                token_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                access_token_ttl: 900,
                refresh_token_ttl: 864_000,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = clipstream::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Seed a user directly in the database
    pub async fn seed_user(&self, username: &str, password_plain: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: format!("{} Example", username),
            password_hash: password::hash_password(password_plain).unwrap(),
            avatar_url: None,
            cover_image_url: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        self.state.db.insert_user(&user).await.unwrap();
        user
    }

    /// Seed a video directly in the database
    pub async fn seed_video(&self, owner: &User, title: &str, published: bool) -> Video {
        let now = Utc::now();
        let video = Video {
            id: EntityId::new().0,
            owner_id: owner.id.clone(),
            title: title.to_string(),
            description: format!("about {}", title),
            video_url: format!("https://media.test.example.com/videos/{}.mp4", title),
            thumbnail_url: format!("https://media.test.example.com/thumbnails/{}.webp", title),
            duration_seconds: 12.0,
            views: 0,
            is_published: published,
            created_at: now,
            updated_at: now,
        };
        self.state.db.insert_video(&video).await.unwrap();
        video
    }

    /// Seed a subscription edge directly in the database
    pub async fn seed_subscription(&self, subscriber: &User, channel: &User) {
        let subscription = Subscription {
            id: EntityId::new().0,
            subscriber_id: subscriber.id.clone(),
            channel_id: channel.id.clone(),
            created_at: Utc::now(),
        };
        self.state
            .db
            .insert_subscription(&subscription)
            .await
            .unwrap();
    }

    /// Log in through the API and return (accessToken, refreshToken)
    pub async fn login(&self, username: &str, password_plain: &str) -> (String, String) {
        let response = self
            .client
            .post(self.url("/api/v1/users/login"))
            .json(&serde_json::json!({
                "username": username,
                "password": password_plain,
            }))
            .send()
            .await
            .expect("login request succeeds");
        assert_eq!(response.status(), 200, "login should succeed");

        let body: serde_json::Value = response.json().await.expect("login response body");
        let access = body["data"]["accessToken"].as_str().unwrap().to_string();
        let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
        (access, refresh)
    }
}
