// Hosted table reached over its PostgREST HTTP interface

use crate::config::RemoteConfig;
use crate::error::{CacheError, RemoteError};
use crate::filter::Filter;
use crate::record::{BuyerFields, BuyerRecord};
use crate::remote::{RemoteTable, validate_name};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RETURN_REPRESENTATION: &str = "return=representation";

/// Client for `{url}/rest/v1/{table}` authenticated with the access key
pub struct RestTable {
    client: Client,
    base_url: String,
}

impl RestTable {
    pub fn new(config: &RemoteConfig) -> Result<Self, CacheError> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(config: &RemoteConfig, timeout: Duration) -> Result<Self, CacheError> {
        let key = HeaderValue::from_str(&config.access_key)
            .map_err(|_| CacheError::Configuration("access key is not a valid header value".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.access_key))
            .map_err(|_| CacheError::Configuration("access key is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    fn endpoint(&self, table: &str) -> Result<String, RemoteError> {
        validate_name(table)?;
        Ok(format!("{}/rest/v1/{}", self.base_url, table))
    }

    fn send_rows(request: RequestBuilder) -> Result<Vec<BuyerRecord>, RemoteError> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify(status, body));
        }
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Map a non-success status to the matching remote error
fn classify(status: StatusCode, body: String) -> RemoteError {
    warn!(status = status.as_u16(), body = %body, "Remote request failed");
    match status {
        StatusCode::CONFLICT => RemoteError::Conflict(body),
        _ => RemoteError::Rejected {
            status: status.as_u16(),
            message: body,
        },
    }
}

impl RemoteTable for RestTable {
    fn select_all(&self, table: &str) -> Result<Vec<BuyerRecord>, RemoteError> {
        let url = self.endpoint(table)?;
        let rows = Self::send_rows(self.client.get(&url).query(&[("select", "*")]))?;
        debug!(table, count = rows.len(), "select_all: fetched rows");
        Ok(rows)
    }

    fn find_by_field(&self, table: &str, filter: &Filter) -> Result<Option<BuyerRecord>, RemoteError> {
        let url = self.endpoint(table)?;
        validate_name(&filter.field)?;
        let (field, predicate) = filter.to_query();

        let rows = Self::send_rows(self.client.get(&url).query(&[
            ("select", "*"),
            (field.as_str(), predicate.as_str()),
            ("limit", "1"),
        ]))?;

        debug!(table, %filter, found = !rows.is_empty(), "find_by_field");
        Ok(rows.into_iter().next())
    }

    fn insert(&self, table: &str, row: &BuyerFields) -> Result<BuyerRecord, RemoteError> {
        let url = self.endpoint(table)?;
        let rows = Self::send_rows(
            self.client
                .post(&url)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&[row]),
        )?;

        let created = rows.into_iter().next().ok_or(RemoteError::NotFound)?;
        debug!(table, id = ?created.id, username = %created.username, "insert: row created");
        Ok(created)
    }

    fn update(&self, table: &str, id: i64, patch: &BuyerFields) -> Result<BuyerRecord, RemoteError> {
        let url = self.endpoint(table)?;
        let (field, predicate) = Filter::id(id).to_query();
        let rows = Self::send_rows(
            self.client
                .patch(&url)
                .query(&[(field.as_str(), predicate.as_str())])
                .header("Prefer", RETURN_REPRESENTATION)
                .json(patch),
        )?;

        debug!(table, id, matched = rows.len(), "update: response received");
        rows.into_iter().next().ok_or(RemoteError::NotFound)
    }

    fn delete(&self, table: &str, id: i64) -> Result<(), RemoteError> {
        let url = self.endpoint(table)?;
        let (field, predicate) = Filter::id(id).to_query();
        let rows = Self::send_rows(
            self.client
                .delete(&url)
                .query(&[(field.as_str(), predicate.as_str())])
                .header("Prefer", RETURN_REPRESENTATION),
        )?;

        debug!(table, id, matched = rows.len(), "delete: response received");
        if rows.is_empty() {
            return Err(RemoteError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BuyerCache;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const PATH: &str = "/rest/v1/poshbuyer";

    fn table_for(server: &Server) -> RestTable {
        let config = RemoteConfig::new(Some(server.url()), Some("anon-key".into())).unwrap();
        RestTable::new(&config).unwrap()
    }

    fn row(id: i64, username: &str, last: &str) -> serde_json::Value {
        json!({
            "id": id,
            "username": username,
            "name": format!("{} name", username),
            "firstPurchase": "2023-01-01",
            "lastPurchase": last,
            "interests": null,
            "notes": null
        })
    }

    fn dee() -> BuyerFields {
        BuyerRecord::new("dee")
            .with_name("Dee")
            .with_purchases("2024-03-01", "2024-03-01")
            .fields()
    }

    fn config() -> RemoteConfig {
        RemoteConfig::new(Some("https://example.supabase.co".into()), Some("anon".into())).unwrap()
    }

    #[test]
    fn test_endpoint() {
        let table = RestTable::new(&config()).unwrap();
        assert_eq!(
            table.endpoint("poshbuyer").unwrap(),
            "https://example.supabase.co/rest/v1/poshbuyer"
        );
        assert!(matches!(table.endpoint("../admin"), Err(RemoteError::InvalidName(_))));
    }

    #[test]
    fn test_invalid_key_is_configuration_error() {
        let config = RemoteConfig {
            url: "https://example.supabase.co".to_string(),
            access_key: "bad\nkey".to_string(),
        };
        assert!(matches!(RestTable::new(&config), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify(StatusCode::CONFLICT, "duplicate key".to_string()),
            RemoteError::Conflict(ref msg) if msg == "duplicate key"
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "bad".to_string()),
            RemoteError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_select_all_sends_auth_headers() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", PATH)
            .match_query(Matcher::UrlEncoded("select".into(), "*".into()))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(json!([row(1, "al", "2024-01-01"), row(2, "bo", "2024-02-01")]).to_string())
            .create();

        let rows = table_for(&server).select_all("poshbuyer").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].username, "al");
        assert_eq!(rows[1].id, Some(2));
        assert_eq!(rows[1].interests, "");
        mock.assert();
    }

    #[test]
    fn test_find_by_field_uses_eq_filter() {
        let mut server = Server::new();
        let hit = server
            .mock("GET", PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("username".into(), "eq.al".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(json!([row(1, "al", "2024-01-01")]).to_string())
            .create();
        let miss = server
            .mock("GET", PATH)
            .match_query(Matcher::UrlEncoded("username".into(), "eq.bo".into()))
            .with_status(200)
            .with_body("[]")
            .create();

        let table = table_for(&server);
        let found = table.find_by_field("poshbuyer", &Filter::username("al")).unwrap();
        assert_eq!(found.and_then(|r| r.id), Some(1));
        assert!(table.find_by_field("poshbuyer", &Filter::username("bo")).unwrap().is_none());

        hit.assert();
        miss.assert();
    }

    #[test]
    fn test_find_by_invalid_field_sends_nothing() {
        let mut server = Server::new();
        let mock = server.mock("GET", Matcher::Any).expect(0).create();

        let err = table_for(&server)
            .find_by_field("poshbuyer", &Filter::eq("name;drop", crate::record::IndexValue::Int(1)))
            .unwrap_err();

        assert!(matches!(err, RemoteError::InvalidName(_)));
        mock.assert();
    }

    #[test]
    fn test_insert_posts_array_and_returns_row() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", PATH)
            .match_header("prefer", "return=representation")
            .match_header("apikey", "anon-key")
            .match_body(Matcher::Json(json!([{
                "username": "dee",
                "name": "Dee",
                "firstPurchase": "2024-03-01",
                "lastPurchase": "2024-03-01",
                "interests": "",
                "notes": ""
            }])))
            .with_status(201)
            .with_body(json!([row(9, "dee", "2024-03-01")]).to_string())
            .create();

        let created = table_for(&server).insert("poshbuyer", &dee()).unwrap();

        assert_eq!(created.id, Some(9));
        assert_eq!(created.username, "dee");
        mock.assert();
    }

    #[test]
    fn test_insert_conflict() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", PATH)
            .with_status(409)
            .with_body(r#"{"code":"23505","message":"duplicate key value"}"#)
            .create();

        let err = table_for(&server).insert("poshbuyer", &dee()).unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(ref msg) if msg.contains("duplicate key")));
    }

    #[test]
    fn test_update_patches_by_id() {
        let mut server = Server::new();
        let mock = server
            .mock("PATCH", PATH)
            .match_query(Matcher::UrlEncoded("id".into(), "eq.5".into()))
            .match_header("prefer", "return=representation")
            .match_body(Matcher::PartialJson(json!({"username": "dee", "name": "Dee"})))
            .with_status(200)
            .with_body(json!([row(5, "dee", "2024-03-01")]).to_string())
            .create();

        let updated = table_for(&server).update("poshbuyer", 5, &dee()).unwrap();

        assert_eq!(updated.id, Some(5));
        assert_eq!(updated.name, "dee name");
        mock.assert();
    }

    #[test]
    fn test_update_and_delete_without_match_are_not_found() {
        let mut server = Server::new();
        let _patch = server
            .mock("PATCH", PATH)
            .match_query(Matcher::UrlEncoded("id".into(), "eq.42".into()))
            .with_status(200)
            .with_body("[]")
            .create();
        let _delete = server
            .mock("DELETE", PATH)
            .match_query(Matcher::UrlEncoded("id".into(), "eq.42".into()))
            .with_status(200)
            .with_body("[]")
            .create();

        let table = table_for(&server);
        assert!(matches!(table.update("poshbuyer", 42, &dee()), Err(RemoteError::NotFound)));
        assert!(matches!(table.delete("poshbuyer", 42), Err(RemoteError::NotFound)));
    }

    #[test]
    fn test_delete_by_id() {
        let mut server = Server::new();
        let mock = server
            .mock("DELETE", PATH)
            .match_query(Matcher::UrlEncoded("id".into(), "eq.5".into()))
            .match_header("prefer", "return=representation")
            .with_status(200)
            .with_body(json!([row(5, "al", "2024-01-01")]).to_string())
            .create();

        table_for(&server).delete("poshbuyer", 5).unwrap();
        mock.assert();
    }

    #[test]
    fn test_http_errors_are_rejected() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message":"Invalid API key"}"#)
            .create();

        let err = table_for(&server).select_all("poshbuyer").unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Rejected { status: 401, ref message } if message.contains("Invalid API key")
        ));
    }

    #[test]
    fn test_malformed_body_is_json_error() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create();

        let err = table_for(&server).select_all("poshbuyer").unwrap_err();
        assert!(matches!(err, RemoteError::Json(_)));
    }

    #[test]
    fn test_cache_round_trip() {
        let mut server = Server::new();
        let _load = server
            .mock("GET", PATH)
            .match_query(Matcher::Exact("select=*".into()))
            .with_status(200)
            .with_body(json!([row(1, "al", "2024-01-01"), row(2, "bo", "2024-02-01")]).to_string())
            .create();
        let lookup_al = server
            .mock("GET", PATH)
            .match_query(Matcher::UrlEncoded("username".into(), "eq.al".into()))
            .with_status(200)
            .with_body(json!([row(1, "al", "2024-01-01")]).to_string())
            .create();
        let lookup_dee = server
            .mock("GET", PATH)
            .match_query(Matcher::UrlEncoded("username".into(), "eq.dee".into()))
            .with_status(200)
            .with_body("[]")
            .create();
        let insert = server
            .mock("POST", PATH)
            .with_status(201)
            .with_body(json!([row(3, "dee", "2024-03-01")]).to_string())
            .create();
        let delete = server
            .mock("DELETE", PATH)
            .match_query(Matcher::UrlEncoded("id".into(), "eq.1".into()))
            .with_status(200)
            .with_body(json!([row(1, "al", "2024-01-01")]).to_string())
            .create();

        let mut cache = BuyerCache::new(table_for(&server));
        assert!(cache.last_load_error().is_none());
        let names: Vec<&str> = cache.all_users().iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["bo", "al"]);

        let err = cache.add_user(&BuyerRecord::new("al")).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateUsername(_)));
        lookup_al.assert();

        let created = cache.add_user(&BuyerRecord::new("dee")).unwrap();
        assert_eq!(created.id, Some(3));
        lookup_dee.assert();
        insert.assert();

        let al = cache.all_users().iter().find(|r| r.username == "al").unwrap().clone();
        cache.delete_user(&al).unwrap();
        delete.assert();

        let names: Vec<&str> = cache.all_users().iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["dee", "bo"]);
    }

    #[test]
    fn test_cache_maps_insert_conflict_to_duplicate() {
        let mut server = Server::new();
        let _load = server
            .mock("GET", PATH)
            .match_query(Matcher::Exact("select=*".into()))
            .with_status(200)
            .with_body("[]")
            .create();
        let _lookup = server
            .mock("GET", PATH)
            .match_query(Matcher::UrlEncoded("username".into(), "eq.dee".into()))
            .with_status(200)
            .with_body("[]")
            .create();
        let _insert = server.mock("POST", PATH).with_status(409).with_body("duplicate key").create();

        let mut cache = BuyerCache::new(table_for(&server));
        let err = cache.add_user(&BuyerRecord::new("dee")).unwrap_err();

        assert!(matches!(err, CacheError::DuplicateUsername(ref u) if u == "dee"));
        assert!(cache.all_users().is_empty());
    }

    #[test]
    fn test_cache_load_failure_over_http() {
        let mut server = Server::new();
        let _mock = server.mock("GET", PATH).match_query(Matcher::Any).with_status(503).with_body("down").create();

        let cache = BuyerCache::new(table_for(&server));

        assert!(!cache.is_loading());
        assert!(cache.all_users().is_empty());
        assert!(cache.last_load_error().unwrap().contains("503"));
    }
}
