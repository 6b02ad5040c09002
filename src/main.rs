//! Feed Curator binary entrypoint.
//! Boots the Axum HTTP trigger on Shuttle. A scheduler POSTs `/run`.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Shuttle may already own the global subscriber.
    feed_curator::logging::try_init();

    let router = feed_curator::app().await?;
    Ok(router.into())
}
