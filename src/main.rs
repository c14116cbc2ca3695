#![deny(rust_2018_idioms)]

use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
	runr::run().await
}
