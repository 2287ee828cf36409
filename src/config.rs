use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "todo.db".to_string()),
        }
    }
}
