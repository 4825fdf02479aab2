//! service_user - users of a service (generic, pg_user, valkey_user)
//!
//! ID: `project/service_name/username`. A password given in configuration is
//! applied with a `reset-credentials` call right after the user is created.

use std::sync::LazyLock;
use std::time::Duration;

use aivenctl_core::resource::Value;
use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::service::service_path;
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, ApiError, Result, is_not_found, omit_not_found};
use crate::schemautil::{
    build_resource_id, flatten_to_string, get_str, require_str, resource_data_set, split3,
};
use crate::waiter::retry;

/// How long a new user may take to show up with its password
const NEW_USER_TIMEOUT: Duration = Duration::from_secs(60);
const PASSWORD_NOT_RECEIVED: &str = "password is not received from the API";

static USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*$|[a-zA-Z0-9_?][a-zA-Z0-9_?.-]{0,63})$").expect("valid username regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    Generic,
    Pg,
    Valkey,
}

impl UserKind {
    pub fn type_name(self) -> &'static str {
        match self {
            UserKind::Generic => "service_user",
            UserKind::Pg => "pg_user",
            UserKind::Valkey => "valkey_user",
        }
    }

    fn extra_fields(self) -> Vec<AttributeSchema> {
        let acl = |name: &str, others: &[&str], desc: &str| {
            let attr = AttributeSchema::new(name, AttributeType::List(Box::new(AttributeType::String)))
                .force_new()
                .diff_suppress(DiffSuppress::EmptyObject)
                .with_description(desc);
            if others.is_empty() {
                attr
            } else {
                attr.required_with(others)
            }
        };

        match self {
            UserKind::Generic => vec![
                AttributeSchema::new("authentication", AttributeType::Enum(vec![
                    "caching_sha2_password".to_string(),
                    "mysql_native_password".to_string(),
                ]))
                .diff_suppress(DiffSuppress::EmptyObject)
                .with_description("Authentication details for MySQL users."),
            ],
            UserKind::Pg => vec![
                AttributeSchema::new("pg_allow_replication", AttributeType::Bool).with_description(
                    "Allows replication. For the default avnadmin user this attribute is required \
                     and is always `true`.",
                ),
            ],
            UserKind::Valkey => vec![
                acl(
                    "valkey_acl_categories",
                    &["valkey_acl_commands", "valkey_acl_keys"],
                    "Allow or disallow command categories. To allow a category use the prefix \
                     `+@` and to disallow use `-@`.",
                ),
                acl(
                    "valkey_acl_commands",
                    &["valkey_acl_categories", "valkey_acl_keys"],
                    "Defines rules for individual commands. To allow a command use the prefix `+` \
                     and to disallow use `-`.",
                ),
                acl(
                    "valkey_acl_keys",
                    &["valkey_acl_categories", "valkey_acl_commands"],
                    "Key access rules. Entries are defined as standard glob patterns.",
                ),
                acl(
                    "valkey_acl_channels",
                    &[],
                    "Allows and disallows access to pub/sub channels. Entries are defined as \
                     standard glob patterns.",
                ),
            ],
        }
    }

    fn access_control(self, attrs: &Attributes) -> Option<AccessControl> {
        let list = |key: &str| Some(flatten_to_string(attrs.get(key)));
        match self {
            UserKind::Generic => None,
            UserKind::Pg => Some(AccessControl {
                pg_allow_replication: Some(matches!(
                    attrs.get("pg_allow_replication"),
                    Some(Value::Bool(true))
                )),
                ..Default::default()
            }),
            UserKind::Valkey => Some(AccessControl {
                valkey_acl_categories: list("valkey_acl_categories"),
                valkey_acl_commands: list("valkey_acl_commands"),
                valkey_acl_keys: list("valkey_acl_keys"),
                valkey_acl_channels: list("valkey_acl_channels"),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AccessControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_allow_replication: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valkey_acl_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valkey_acl_commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valkey_acl_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valkey_acl_channels: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServiceUser {
    pub username: String,
    /// `None` when the password was overridden by the user
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "type")]
    pub user_type: String,
    #[serde(default)]
    pub authentication: Option<String>,
    #[serde(default)]
    pub access_cert: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub access_control: Option<AccessControl>,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_control: Option<AccessControl>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
enum ModifyUserRequest<'a> {
    ResetCredentials {
        #[serde(skip_serializing_if = "Option::is_none")]
        new_password: Option<&'a str>,
    },
    SetAccessControl {
        access_control: AccessControl,
    },
}

#[derive(Debug, Serialize)]
struct UserView<'a> {
    project: &'a str,
    service_name: &'a str,
    username: &'a str,
    password: Option<&'a str>,
    #[serde(rename = "type")]
    user_type: &'a str,
    authentication: Option<&'a str>,
    access_cert: Option<&'a str>,
    access_key: Option<&'a str>,
    #[serde(flatten)]
    access_control: Option<&'a AccessControl>,
}

pub fn schema(kind: UserKind) -> ResourceSchema {
    let computed = |name: &str, desc: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .computed()
            .with_description(desc)
    };
    let description = match kind {
        UserKind::Generic => "Creates and manages an Aiven service user.",
        UserKind::Pg => "Creates and manages an Aiven for PostgreSQL service user.",
        UserKind::Valkey => "Creates and manages an Aiven for Valkey service user.",
    };

    ResourceSchema::new(kind.type_name())
        .with_description(description)
        .attribute(
            AttributeSchema::new("project", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the project this resource belongs to."),
        )
        .attribute(
            AttributeSchema::new("service_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the service that this resource belongs to."),
        )
        .attribute(
            AttributeSchema::new(
                "username",
                AttributeType::Custom {
                    name: "ServiceUsername".to_string(),
                    base: Box::new(AttributeType::String),
                    validate: |value| match value {
                        Value::String(s) if USERNAME.is_match(s) => Ok(()),
                        Value::String(s) => Err(format!("invalid service user name: {}", s)),
                        _ => Ok(()),
                    },
                },
            )
            .required()
            .force_new()
            .with_description("The name of the service user for this service."),
        )
        .attribute(
            AttributeSchema::new("password", AttributeType::String)
                .optional_computed()
                .sensitive()
                .diff_suppress(DiffSuppress::EmptyObject)
                .with_description("The password of the service user."),
        )
        .attribute(computed(
            "type",
            "The service user account type, either primary or regular.",
        ))
        .attribute(
            computed("access_cert", "The access certificate for the service user.").sensitive(),
        )
        .attribute(
            computed("access_key", "The access certificate key for the service user.").sensitive(),
        )
        .attributes(kind.extra_fields())
}

fn user_path(project: &str, service: &str, username: &str) -> String {
    format!("{}/user/{}", service_path(project, service), escape(username))
}

pub async fn get_user(
    client: &AivenClient,
    project: &str,
    service: &str,
    username: &str,
) -> Result<ServiceUser> {
    let body = client.get(&user_path(project, service, username)).await?;
    Ok(serde_json::from_value(take_field(body, "user")?)?)
}

/// Check the user is listed on the service
pub async fn lookup_user(client: &AivenClient, project: &str, service: &str, username: &str) -> Result<()> {
    let body = client.get(&service_path(project, service)).await?;
    let found = body["service"]["users"]
        .as_array()
        .into_iter()
        .flatten()
        .any(|u| u["username"].as_str() == Some(username));
    if found {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("user {}/{}/{} not found", project, service, username)).into())
    }
}

pub fn user_attributes(kind: UserKind, project: &str, service: &str, user: &ServiceUser) -> Result<Attributes> {
    let view = UserView {
        project,
        service_name: service,
        username: &user.username,
        password: user.password.as_deref(),
        user_type: &user.user_type,
        authentication: user.authentication.as_deref(),
        access_cert: user.access_cert.as_deref(),
        access_key: user.access_key.as_deref(),
        access_control: user.access_control.as_ref(),
    };
    resource_data_set(
        &schema(kind),
        &build_resource_id(&[project, service, &user.username]),
        &view,
        &[],
    )
}

async fn reset_password(
    client: &AivenClient,
    project: &str,
    service: &str,
    username: &str,
    password: Option<&str>,
) -> Result<()> {
    client
        .put(
            &user_path(project, service, username),
            &ModifyUserRequest::ResetCredentials {
                new_password: password,
            },
        )
        .await
        .map_err(|e| AivenError::Other(format!("error setting password: {}", e)))?;
    Ok(())
}

pub struct ServiceUserHandler {
    kind: UserKind,
}

impl ServiceUserHandler {
    pub fn new(kind: UserKind) -> Self {
        Self { kind }
    }

    /// A freshly created user may briefly be missing or lack its password
    async fn wait_for_user(
        &self,
        ctx: &HandlerContext<'_>,
        project: &str,
        service: &str,
        username: &str,
    ) -> Result<()> {
        retry(
            NEW_USER_TIMEOUT.min(ctx.timeouts.create),
            ctx.retry_interval(),
            |e| is_not_found(e) || e.to_string() == PASSWORD_NOT_RECEIVED,
            || async move {
                let user = get_user(ctx.client, project, service, username).await?;
                if user.password.as_deref().unwrap_or_default().is_empty() {
                    return Err(AivenError::Other(PASSWORD_NOT_RECEIVED.to_string()));
                }
                Ok(())
            },
        )
        .await
    }
}

#[async_trait]
impl ResourceHandler for ServiceUserHandler {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn schema(&self) -> ResourceSchema {
        schema(self.kind)
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let service = require_str(attrs, "service_name")?;
        let username = require_str(attrs, "username")?;

        let request = CreateUserRequest {
            username,
            authentication: get_str(attrs, "authentication"),
            access_control: self.kind.access_control(attrs),
        };
        ctx.client
            .post(&format!("{}/user", service_path(project, service)), &request)
            .await?;

        if let Some(password) = get_str(attrs, "password") {
            reset_password(ctx.client, project, service, username, Some(password)).await?;
        }

        self.wait_for_user(ctx, project, service, username).await?;
        Ok(build_resource_id(&[project, service, username]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, service, username) = split3(id)?;
        let user = get_user(ctx.client, &project, &service, &username).await?;
        user_attributes(self.kind, &project, &service, &user)
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let (project, service, username) = split3(id)?;
        let current = get_user(ctx.client, &project, &service, &username).await?;

        let password = get_str(attrs, "password");
        if password.is_some() && password != current.password.as_deref() {
            reset_password(ctx.client, &project, &service, &username, password).await?;
        }

        if self.kind == UserKind::Pg {
            let wanted = matches!(attrs.get("pg_allow_replication"), Some(Value::Bool(true)));
            let actual = current
                .access_control
                .as_ref()
                .and_then(|a| a.pg_allow_replication)
                .unwrap_or_default();
            if wanted != actual {
                ctx.client
                    .put(
                        &user_path(&project, &service, &username),
                        &ModifyUserRequest::SetAccessControl {
                            access_control: AccessControl {
                                pg_allow_replication: Some(wanted),
                                ..Default::default()
                            },
                        },
                    )
                    .await
                    .map_err(|e| AivenError::Other(format!("error updating credentials: {}", e)))?;
            }
        }

        Ok(id.to_string())
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, service, username) = split3(id)?;
        omit_not_found(
            ctx.client
                .delete(&user_path(&project, &service, &username))
                .await,
        )
    }
}
