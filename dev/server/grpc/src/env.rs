use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Env {
    pub listen: String,
    pub port: String,
    pub slow: Duration,
}
impl Default for Env {
    fn default() -> Self {
        Self { listen: "0.0.0.0".to_string(), port: "50051".to_string(), slow: Duration::from_millis(200) }
    }
}
impl Env {
    pub fn environment(default: Self) -> Self {
        Self {
            listen: std::env::var("LISTEN").unwrap_or(default.listen),
            port: std::env::var("PORT").unwrap_or(default.port),
            slow: std::env::var("SLOW_MILLIS")
                .ok()
                .and_then(|millis| millis.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.slow),
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}
