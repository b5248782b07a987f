#![allow(dead_code)]

use clap::Parser;
use fleeting_server::AppBuilder;
use fleeting_server::adapters::store::{InMemoryMessageRepository, MessageRepository};
use fleeting_server::config::{Config, DeliveryMode};
use reqwest::Client;
use serde_json::Value;
use std::sync::{Arc, Once};
use tokio::net::TcpListener;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("fleeting_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::parse_from(["fleeting-server", "--store-backend", "memory"]);
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0; // 0 means let OS choose
    config
}

pub struct TestApp {
    pub server_url: String,
    pub client: Client,
    pub repo: InMemoryMessageRepository,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(None, DeliveryMode::AtLeastOnce).await
    }

    pub async fn spawn_with(page_size: Option<usize>, delivery: DeliveryMode) -> Self {
        let mut config = get_test_config();
        config.messaging.delivery = delivery;

        let repo = InMemoryMessageRepository::new(page_size);
        let server_url = Self::serve(config, Arc::new(repo.clone())).await;

        Self { server_url, client: Client::new(), repo }
    }

    /// Serves the router over `store` instead of the in-memory repository; `repo` stays empty.
    pub async fn spawn_with_store(config: Config, store: Arc<dyn MessageRepository>) -> Self {
        let server_url = Self::serve(config, store).await;
        Self { server_url, client: Client::new(), repo: InMemoryMessageRepository::default() }
    }

    async fn serve(config: Config, store: Arc<dyn MessageRepository>) -> String {
        setup_tracing();

        let app = AppBuilder::new(config.clone()).with_repository(store).build().await.unwrap();
        let router = fleeting_server::api::app_router(&config, app.message_service);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{addr}")
    }

    pub async fn create(&self, body: &Value) -> reqwest::Response {
        self.client.post(format!("{}/chats", self.server_url)).json(body).send().await.unwrap()
    }

    /// Creates a message and returns its id, panicking unless the server answered 201.
    pub async fn create_ok(&self, body: &Value) -> String {
        let resp = self.create(body).await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn read(&self, id_or_username: &str) -> reqwest::Response {
        self.client.get(format!("{}/chats/{}", self.server_url, id_or_username)).send().await.unwrap()
    }

    pub async fn list(&self, username: &str) -> Vec<Value> {
        let resp = self.read(username).await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        resp.json().await.unwrap()
    }
}
