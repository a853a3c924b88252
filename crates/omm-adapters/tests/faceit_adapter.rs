use std::time::Duration;

use omm_adapters::{
    FaceitAdapter, PaginationLimits, Paginator, Resource, StopReason, UpstreamSource,
};
use omm_core::DeadlineClock;
use omm_storage::{HttpClientConfig, HttpFetcher};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> FaceitAdapter {
    let http = HttpFetcher::new(HttpClientConfig::default()).expect("client");
    FaceitAdapter::new(http, &server.uri(), "faceit-key").expect("adapter")
}

#[test]
fn page_urls_follow_the_data_api_layout() {
    let http = HttpFetcher::new(HttpClientConfig::default()).expect("client");
    let adapter =
        FaceitAdapter::new(http, "https://open.faceit.com/data/v4", "k").expect("adapter");

    let tournaments = adapter
        .page_url(&Resource::OngoingTournaments { game: "cs2".into() }, 100, 200)
        .expect("url");
    assert_eq!(
        tournaments.as_str(),
        "https://open.faceit.com/data/v4/championships?game=cs2&type=ongoing&limit=100&offset=200"
    );

    let matches = adapter
        .page_url(
            &Resource::TournamentMatches {
                tournament_id: "abc-123".into(),
            },
            50,
            0,
        )
        .expect("url");
    assert_eq!(
        matches.as_str(),
        "https://open.faceit.com/data/v4/championships/abc-123/matches?limit=50&offset=0"
    );
}

#[tokio::test]
async fn ongoing_tournaments_are_requested_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/championships"))
        .and(query_param("game", "cs2"))
        .and(query_param("type", "ongoing"))
        .and(query_param("offset", "0"))
        .and(header("Authorization", "Bearer faceit-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"championship_id": "c1", "name": "Cup"}],
            "start": 0,
            "end": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = adapter(&server)
        .fetch_page(&Resource::OngoingTournaments { game: "cs2".into() }, 100, 0)
        .await
        .expect("page");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["championship_id"], "c1");
}

#[tokio::test]
async fn missing_items_key_reads_as_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/championships/c1/matches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"start": 0})))
        .mount(&server)
        .await;

    let items = adapter(&server)
        .fetch_page(
            &Resource::TournamentMatches {
                tournament_id: "c1".into(),
            },
            100,
            0,
        )
        .await
        .expect("page");
    assert!(items.is_empty());
}

#[tokio::test]
async fn bad_status_and_bad_body_are_source_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/championships/forbidden/matches"))
        .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/championships/garbled/matches"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let forbidden = adapter
        .fetch_page(
            &Resource::TournamentMatches {
                tournament_id: "forbidden".into(),
            },
            100,
            0,
        )
        .await
        .expect_err("403");
    assert_eq!(forbidden.status(), Some(403));

    let garbled = adapter
        .fetch_page(
            &Resource::TournamentMatches {
                tournament_id: "garbled".into(),
            },
            100,
            0,
        )
        .await
        .expect_err("html body");
    assert!(garbled.to_string().contains("unparseable body"));
}

#[tokio::test]
async fn paginator_walks_offsets_until_a_short_page() {
    let server = MockServer::start().await;
    let full_page: Vec<_> = (0..2).map(|i| json!({"match_id": format!("m{i}")})).collect();
    Mock::given(method("GET"))
        .and(path("/championships/c1/matches"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": full_page })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/championships/c1/matches"))
        .and(query_param("offset", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "items": [{"match_id": "m2"}] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let clock = DeadlineClock::start(Duration::from_secs(60), Duration::from_millis(1500));
    let mut pager = Paginator::new(
        &adapter,
        Resource::TournamentMatches {
            tournament_id: "c1".into(),
        },
        PaginationLimits {
            page_size: 2,
            max_pages: 10,
        },
        clock,
    );

    let mut ids = Vec::new();
    while let Some(item) = pager.next_item().await {
        ids.push(item["match_id"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(ids, vec!["m0", "m1", "m2"]);
    assert_eq!(pager.stop_reason(), Some(StopReason::ShortPage));
    assert_eq!(pager.pages_fetched(), 2);
}
