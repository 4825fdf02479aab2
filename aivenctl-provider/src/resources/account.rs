//! account - an Aiven account grouping projects, teams and billing groups

use std::time::Duration;

use aivenctl_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{ApiError, Result, omit_not_found};
use crate::schemautil::{get_str, rename_aliases_reverse, require_str, resource_data_set};
use crate::waiter::retry;

pub const TYPE_NAME: &str = "account";

/// Deleting an account fails until its billing groups have released their projects
const DELETE_RETRY_TIMEOUT: Duration = Duration::from_secs(30);
const BILLING_GROUP_IN_USE: &str = "Billing group with existing projects cannot be deleted";

const ALIASES: &[(&str, &str)] = &[("name", "account_name"), ("owner_team_id", "account_owner_team_id")];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_billing_group_id: Option<String>,
    #[serde(default)]
    pub account_owner_team_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub create_time: String,
    #[serde(default)]
    pub update_time: String,
    #[serde(default)]
    pub is_account_owner: bool,
}

#[derive(Debug, Serialize)]
struct AccountRequest<'a> {
    account_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_billing_group_id: Option<&'a str>,
}

pub fn schema() -> ResourceSchema {
    let dropped = "The new organization resource won't have it, and will not have a replacement.";
    ResourceSchema::new(TYPE_NAME)
        .with_description("The Account resource allows the creation and management of an Aiven Account.")
        .deprecated("This resource will be removed in a future release, use organizations instead.")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Account name"),
        )
        .attribute(
            AttributeSchema::new("primary_billing_group_id", AttributeType::String)
                .force_new()
                .with_description("Billing group id")
                .deprecated(dropped),
        )
        .attribute(
            AttributeSchema::new("account_id", AttributeType::String)
                .computed()
                .with_description("Account id")
                .deprecated("Use the built-in ID field instead."),
        )
        .attribute(
            AttributeSchema::new("owner_team_id", AttributeType::String)
                .computed()
                .with_description("Owner team id")
                .deprecated(dropped),
        )
        .attribute(
            AttributeSchema::new("tenant_id", AttributeType::String)
                .computed()
                .with_description("Tenant id"),
        )
        .attribute(
            AttributeSchema::new("create_time", AttributeType::String)
                .computed()
                .with_description("Time of creation"),
        )
        .attribute(
            AttributeSchema::new("update_time", AttributeType::String)
                .computed()
                .with_description("Time of last update"),
        )
        .attribute(
            AttributeSchema::new("is_account_owner", AttributeType::Bool)
                .computed()
                .with_description("If true, user is part of the owners team for this account")
                .deprecated(dropped),
        )
}

pub async fn get_account(client: &AivenClient, account_id: &str) -> Result<Account> {
    let body = client.get(&format!("/account/{}", escape(account_id))).await?;
    Ok(serde_json::from_value(take_field(body, "account")?)?)
}

/// Look an account up by its name
pub async fn find_account(client: &AivenClient, name: &str) -> Result<Account> {
    let body = client.get("/account").await?;
    let accounts: Vec<Account> = serde_json::from_value(take_field(body, "accounts")?)?;
    accounts
        .into_iter()
        .find(|a| a.account_name == name)
        .ok_or_else(|| ApiError::not_found(format!("account {} not found", name)).into())
}

pub fn account_attributes(account: &Account) -> Result<Attributes> {
    resource_data_set(
        &schema(),
        &account.account_id,
        account,
        &[rename_aliases_reverse(ALIASES)],
    )
}

fn request(attrs: &Attributes) -> Result<AccountRequest<'_>> {
    Ok(AccountRequest {
        account_name: require_str(attrs, "name")?,
        primary_billing_group_id: get_str(attrs, "primary_billing_group_id"),
    })
}

pub struct AccountHandler;

#[async_trait]
impl ResourceHandler for AccountHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let body = ctx.client.post("/account", &request(attrs)?).await?;
        let account: Account = serde_json::from_value(take_field(body, "account")?)?;
        Ok(account.account_id)
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        account_attributes(&get_account(ctx.client, id).await?)
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let body = ctx
            .client
            .put(&format!("/account/{}", escape(id)), &request(attrs)?)
            .await?;
        let account: Account = serde_json::from_value(take_field(body, "account")?)?;
        Ok(account.account_id)
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let path = format!("/account/{}", escape(id));
        let path = path.as_str();
        let deleted = retry(
            DELETE_RETRY_TIMEOUT,
            ctx.retry_interval(),
            |e| e.to_string().contains(BILLING_GROUP_IN_USE),
            || async move { ctx.client.delete(path).await },
        )
        .await;
        omit_not_found(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{TestEnv, s};
    use aivenctl_core::resource::Value;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account_json() -> serde_json::Value {
        json!({
            "account": {
                "account_id": "a28707e316df",
                "account_name": "acme",
                "account_owner_team_id": "at28707e316dd",
                "tenant_id": "aiven",
                "create_time": "2024-01-01T00:00:00Z",
                "update_time": "2024-01-02T00:00:00Z",
                "is_account_owner": true
            }
        })
    }

    #[tokio::test]
    async fn create_and_read() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/account"))
            .and(body_json(json!({"account_name": "acme"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(account_json()))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/account/a28707e316df"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_json()))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = HashMap::from([("name".to_string(), s("acme"))]);
        let id = AccountHandler.create(&env.ctx(), &attrs).await.unwrap();
        assert_eq!(id, "a28707e316df");

        let read = AccountHandler.read(&env.ctx(), &id).await.unwrap();
        assert_eq!(read.get("name"), Some(&s("acme")));
        assert_eq!(read.get("owner_team_id"), Some(&s("at28707e316dd")));
        assert_eq!(read.get("is_account_owner"), Some(&Value::Bool(true)));
        assert!(!read.contains_key("account_name"));
    }

    #[tokio::test]
    async fn delete_retries_while_billing_group_has_projects() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/account/a28707e316df"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "message": "Billing group with existing projects cannot be deleted"
            })))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/account/a28707e316df"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        AccountHandler
            .delete(&env.ctx(), "a28707e316df")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_ignores_missing_account() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Account not found"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        AccountHandler.delete(&env.ctx(), "gone").await.unwrap();
    }

    #[tokio::test]
    async fn find_by_name() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accounts": [account_json()["account"].clone()]
            })))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let account = find_account(&env.client, "acme").await.unwrap();
        assert_eq!(account.account_id, "a28707e316df");

        let err = find_account(&env.client, "other").await.unwrap_err();
        assert!(crate::errors::is_not_found(&err));
    }
}
