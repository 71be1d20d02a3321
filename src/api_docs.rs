use crate::api;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::quest::list_quests,
        api::shop::list_items,
        api::shop::purchase_item,
        // Add other endpoints here as we document them
    ),
    tags(
        (name = "questledger", description = "QuestLedger API")
    )
)]
pub struct ApiDoc;
