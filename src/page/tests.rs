use super::*;
use crate::error::FetchError;
use crate::http::{RetryClient, RetryPolicy};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn records(values: serde_json::Value) -> Vec<Record> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn fast_client(statuses: &[u16]) -> RetryClient {
    let policy = RetryPolicy::transient(statuses.iter().copied())
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5));
    RetryClient::new(policy).unwrap()
}

#[test]
fn test_page_result_last_has_no_token() {
    let page = PageResult::last(vec![]);
    assert!(page.is_last());
    assert!(page.next_token().is_none());

    let page = PageResult::more(vec![], PageToken::Number(2));
    assert!(!page.is_last());
}

#[test]
fn test_offset_pages_until_short_page() {
    let pagination = Pagination::offset("skip", 2).with_size_param("limit", 2);
    let request = pagination.prepare(&PageRequest::new("/transcripts"));
    assert_eq!(request.params["skip"], json!(0));
    assert_eq!(request.params["limit"], json!(2));

    let full = records(json!([{"id": 1}, {"id": 2}]));
    let token = pagination.continuation(&request, &json!({}), &full).unwrap();
    assert_eq!(token, PageToken::Number(2));

    let next = pagination.apply_token(&request, token);
    assert_eq!(next.params["skip"], json!(2));

    let short = records(json!([{"id": 3}]));
    assert!(pagination.continuation(&next, &json!({}), &short).is_none());
    assert!(pagination.continuation(&next, &json!({}), &[]).is_none());
}

#[test]
fn test_page_number_increments_by_one() {
    let pagination = Pagination::page_number("page", 2);
    let request = pagination.prepare(&PageRequest::new("/boards"));
    assert_eq!(request.params["page"], json!(1));

    let full = records(json!([{"id": 1}, {"id": 2}]));
    let token = pagination.continuation(&request, &json!({}), &full);
    assert_eq!(token, Some(PageToken::Number(2)));
}

#[test]
fn test_cursor_token_from_nested_body_path() {
    let pagination = Pagination::cursor("starting_after", TokenSource::body("pages.next.starting_after"));
    let request = PageRequest::new("/contacts");

    let body = json!({"data": [], "pages": {"next": {"starting_after": "WzE3MF0="}}});
    let token = pagination.continuation(&request, &body, &[]).unwrap();
    assert_eq!(token, PageToken::Cursor("WzE3MF0=".to_string()));

    let next = pagination.apply_token(&request, token);
    assert_eq!(next.params["starting_after"], json!("WzE3MF0="));
    assert_eq!(next.endpoint, "/contacts");

    assert!(pagination
        .continuation(&request, &json!({"pages": {}}), &[])
        .is_none());
    assert!(pagination
        .continuation(&request, &json!({"pages": {"next": {"starting_after": ""}}}), &[])
        .is_none());
}

#[test]
fn test_cursor_token_from_last_item_while_has_more() {
    let pagination = Pagination::cursor("starting_after", TokenSource::last_item("id", "has_more"));
    let request = PageRequest::new("/v1/charges");
    let items = records(json!([{"id": "ch_1"}, {"id": "ch_2"}]));

    let token = pagination.continuation(&request, &json!({"has_more": true}), &items);
    assert_eq!(token, Some(PageToken::Cursor("ch_2".to_string())));

    let done = pagination.continuation(&request, &json!({"has_more": false}), &items);
    assert!(done.is_none());
}

#[test]
fn test_scroll_swaps_endpoint_and_replaces_params() {
    let pagination = Pagination::scroll("/companies/scroll", "scroll_param", "scroll_param");
    let request = PageRequest::new("/companies/scroll").param("per_page", 50);
    let items = records(json!([{"id": "c1"}]));

    let token = pagination
        .continuation(&request, &json!({"scroll_param": "abc"}), &items)
        .unwrap();
    let next = pagination.apply_token(&request, token);
    assert_eq!(next.endpoint, "/companies/scroll");
    assert_eq!(next.params.len(), 1);
    assert_eq!(next.params["scroll_param"], json!("abc"));

    // An empty page ends the scroll even if a token comes back
    assert!(pagination
        .continuation(&next, &json!({"scroll_param": "abc"}), &[])
        .is_none());
}

#[test]
fn test_single_is_always_last() {
    let items = records(json!([{"id": 1}]));
    assert!(Pagination::Single
        .continuation(&PageRequest::new("/admins"), &json!({}), &items)
        .is_none());
}

#[test]
fn test_response_shapes() {
    let bare = json!([{"id": 1}, {"id": 2}]);
    assert_eq!(ResponseShape::BareList.extract(&bare).unwrap().len(), 2);
    assert_eq!(ResponseShape::default().extract(&bare).unwrap().len(), 2);

    let wrapped = json!({"data": [{"id": 1}], "pages": {}});
    assert_eq!(ResponseShape::path("data").extract(&wrapped).unwrap().len(), 1);

    let results = json!({"results": [{"id": 1}, {"id": 2}, {"id": 3}]});
    assert_eq!(ResponseShape::default().extract(&results).unwrap().len(), 3);

    let single = json!({"result": {"id": 9}});
    let items = ResponseShape::default().extract(&single).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(9));

    let bare_object = json!({"id": 4, "name": "campaign"});
    assert_eq!(ResponseShape::default().extract(&bare_object).unwrap().len(), 1);

    let null_data = json!({"data": null});
    assert!(ResponseShape::path("data").extract(&null_data).unwrap().is_empty());

    let empty_object = json!({"data": {"analytics": {}}});
    assert!(ResponseShape::path("data.analytics")
        .extract(&empty_object)
        .unwrap()
        .is_empty());
}

#[test]
fn test_missing_data_key_is_protocol_error() {
    let err = ResponseShape::path("data")
        .extract(&json!({"type": "list"}))
        .unwrap_err();
    assert!(matches!(err, FetchError::Protocol(_)));

    let err = ResponseShape::BareList.extract(&json!({"data": []})).unwrap_err();
    assert!(matches!(err, FetchError::Protocol(_)));

    let err = ResponseShape::path("data").extract(&json!({"data": [1, 2]})).unwrap_err();
    assert!(matches!(err, FetchError::Protocol(_)));
}

#[test]
fn test_graphql_errors_without_data_are_fatal() {
    let body = json!({
        "data": null,
        "errors": [{"message": "Invalid API key"}, {"extensions": {}}]
    });
    let err = graphql::extract(&body, &ResponseShape::path("data.transcripts")).unwrap_err();
    match err {
        FetchError::Protocol(msg) => {
            assert_eq!(msg, "GraphQL error: Invalid API key, Unknown error")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_graphql_partial_errors_are_attached_to_items() {
    let body = json!({
        "data": {"transcripts": [{"id": "t1"}, {"id": "t2"}]},
        "errors": [
            {"message": "denied", "path": ["transcripts", 1, "summary"]},
            {"message": "denied", "path": ["transcripts", 1, "analytics"]},
            {"message": "other", "path": ["user"]}
        ]
    });
    let items = graphql::extract(&body, &ResponseShape::path("data.transcripts")).unwrap();
    assert_eq!(items[0]["error"], serde_json::Value::Null);
    assert_eq!(items[1]["error"], json!("summary, analytics"));
}

#[test]
fn test_graphql_without_errors_leaves_items_alone() {
    let body = json!({"data": {"users": [{"user_id": "u1"}]}});
    let items = graphql::extract(&body, &ResponseShape::path("data.users")).unwrap();
    assert!(!items[0].contains_key("error"));
}

#[tokio::test]
async fn test_fetcher_sends_query_params_and_reads_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/contacts")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "2".into()),
            Matcher::UrlEncoded("starting_after".into(), "abc".into()),
        ]))
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": [{"id": "1"}, {"id": "2"}], "pages": {"next": {"starting_after": "def"}}}"#)
        .create_async()
        .await;

    let fetcher = PageFetcher::new(fast_client(&[429]), server.url())
        .bearer_auth("secret")
        .pagination(
            Pagination::cursor("starting_after", TokenSource::body("pages.next.starting_after"))
                .with_size_param("per_page", 2),
        )
        .shape(ResponseShape::path("data"));

    let request = PageRequest::new("/contacts").param("starting_after", "abc");
    let page = fetcher.fetch_page(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.next_token(), Some(&PageToken::Cursor("def".to_string())));
}

#[tokio::test]
async fn test_fetcher_posts_json_body_with_nested_pagination() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/contacts/search")
        .match_body(Matcher::PartialJson(json!({
            "query": {"field": "updated_at", "operator": ">", "value": 100},
            "pagination": {"per_page": 150, "starting_after": "tok"}
        })))
        .with_status(200)
        .with_body(r#"{"data": [{"id": "c1"}], "pages": {}}"#)
        .create_async()
        .await;

    let fetcher = PageFetcher::new(fast_client(&[429]), server.url())
        .body(RequestBody::Json(json!({
            "query": {"field": "updated_at", "operator": ">", "value": 100}
        })))
        .pagination(
            Pagination::cursor(
                "pagination.starting_after",
                TokenSource::body("pages.next.starting_after"),
            )
            .with_size_param("pagination.per_page", 150),
        )
        .shape(ResponseShape::path("data"));

    let request = PageRequest::new("/contacts/search").param("pagination.starting_after", "tok");
    let page = fetcher.fetch_page(&request).await.unwrap();

    mock.assert_async().await;
    assert!(page.is_last());
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn test_fetcher_graphql_variables() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/graphql")
        .match_body(Matcher::PartialJson(json!({
            "variables": {"limit": 2, "skip": 0}
        })))
        .with_status(200)
        .with_body(r#"{"data": {"bites": [{"id": "b1"}]}}"#)
        .create_async()
        .await;

    let fetcher = PageFetcher::new(fast_client(&[429]), format!("{}/graphql", server.url()))
        .body(RequestBody::graphql("query Bites($limit: Int, $skip: Int) { bites { id } }"))
        .pagination(Pagination::offset("skip", 2).with_size_param("limit", 2))
        .shape(ResponseShape::path("data.bites"));

    let page = fetcher.fetch_page(&PageRequest::new("")).await.unwrap();
    mock.assert_async().await;
    assert!(page.is_last());
    assert_eq!(page.items[0]["id"], json!("b1"));
}

#[tokio::test]
async fn test_fetcher_not_found_as_empty() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/organizations/usage_report")
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;

    let strict = PageFetcher::new(fast_client(&[429]), server.url());
    let err = strict
        .fetch_page(&PageRequest::new("/v1/organizations/usage_report"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));

    let lenient = strict.not_found_as_empty(true);
    let page = lenient
        .fetch_page(&PageRequest::new("/v1/organizations/usage_report"))
        .await
        .unwrap();
    assert!(page.is_last());
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_fetcher_next_request_for_scroll() {
    let client = fast_client(&[429]);
    let fetcher = PageFetcher::new(client, "https://api.intercom.io").pagination(
        Pagination::scroll("/companies/scroll", "scroll_param", "scroll_param"),
    );
    let next = fetcher.next_request(
        &PageRequest::new("/companies/scroll"),
        PageToken::Cursor("s1".to_string()),
    );
    assert_eq!(next.params["scroll_param"], json!("s1"));
    assert_eq!(next.token, Some(PageToken::Cursor("s1".to_string())));
}
