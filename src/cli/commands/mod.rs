use anyhow::Result;

pub mod config;
pub mod simulate;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
