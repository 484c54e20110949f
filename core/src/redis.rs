/// Pool of Redis connections backing the shared guest quota store.
pub fn setup_redis(redis_url: &str) -> Result<deadpool_redis::Pool, deadpool_redis::CreatePoolError> {
    let cfg = deadpool_redis::Config::from_url(redis_url);
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
}
