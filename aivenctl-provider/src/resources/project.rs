//! project - the container for services, VPCs and their users
//!
//! The project name is the resource ID. Renaming goes through update, which
//! returns the new name as the new ID.

use std::collections::BTreeMap;
use std::time::Duration;

use aivenctl_core::resource::Value;
use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, Result, omit_not_found};
use crate::schemautil::{
    flatten_to_string, get_bool, get_str, get_tags, require_str, resource_data_set,
    tags_to_value,
};
use crate::waiter::retry;

pub const TYPE_NAME: &str = "project";

/// Membership of a freshly created project propagates with a delay
const MEMBERSHIP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechEmail {
    pub email: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Project {
    pub project_name: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub default_cloud: Option<String>,
    #[serde(default)]
    pub available_credits: Option<String>,
    #[serde(default)]
    pub estimated_balance: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub billing_group_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub tech_emails: Vec<TechEmail>,
}

#[derive(Debug, Serialize)]
struct CreateProjectRequest<'a> {
    project: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_group_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    copy_from_project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_source_project_billing_group: Option<bool>,
    add_account_owners_admin_access: bool,
    tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tech_emails: Option<Vec<TechEmail>>,
}

#[derive(Debug, Serialize)]
struct UpdateProjectRequest<'a> {
    project_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud: Option<&'a str>,
    add_account_owners_admin_access: bool,
    tags: BTreeMap<String, String>,
    tech_emails: Vec<TechEmail>,
}

#[derive(Debug, Serialize)]
struct ProjectView<'a> {
    project: &'a str,
    account_id: Option<&'a str>,
    parent_id: Option<&'a str>,
    default_cloud: Option<&'a str>,
    billing_group: Option<&'a str>,
    available_credits: Option<&'a str>,
    estimated_balance: Option<&'a str>,
    payment_method: Option<&'a str>,
    technical_emails: Vec<&'a str>,
    ca_cert: Option<String>,
}

pub fn schema() -> ResourceSchema {
    let computed = |name: &str, desc: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .computed()
            .with_description(desc)
    };
    let create_only = |name: &str, attr_type: AttributeType, desc: &str| {
        AttributeSchema::new(name, attr_type)
            .diff_suppress(DiffSuppress::CreateOnly)
            .with_description(desc)
    };

    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages an Aiven project.")
        .attribute(
            AttributeSchema::new("project", AttributeType::String)
                .required()
                .with_description(
                    "The name of the project. Names must be globally unique among all Aiven \
                     customers.",
                ),
        )
        .attribute(
            AttributeSchema::new("account_id", AttributeType::String)
                .optional_computed()
                .with_description("Link a project to an existing account using its account ID.")
                .deprecated(
                    "Use parent_id instead. This field will be removed in the next major release.",
                ),
        )
        .attribute(
            AttributeSchema::new("parent_id", AttributeType::String)
                .diff_suppress(DiffSuppress::EmptyObjectNoChange)
                .with_description(
                    "Link a project to an organization, organizational unit, or account by \
                     using its ID.",
                ),
        )
        .attribute(create_only(
            "copy_from_project",
            AttributeType::String,
            "The name of the project to copy billing information, technical contacts, and some \
             other project attributes from. You can only do this when creating a project.",
        ))
        .attribute(
            create_only(
                "use_source_project_billing_group",
                AttributeType::Bool,
                "Use the same billing group that is used in source project.",
            )
            .deprecated("This field is deprecated and will be removed in the next major release."),
        )
        .attribute(
            AttributeSchema::new("technical_emails", AttributeType::List(Box::new(types::email())))
                .with_description(
                    "The email addresses for project contacts, who will receive important alerts \
                     and updates about this project and its services.",
                ),
        )
        .attribute(
            AttributeSchema::new("default_cloud", AttributeType::String)
                .diff_suppress(DiffSuppress::EmptyObject)
                .with_description(
                    "Default cloud provider and region where services are hosted. Changing it \
                     does not affect existing services.",
                ),
        )
        .attribute(
            AttributeSchema::new("billing_group", AttributeType::String)
                .diff_suppress(DiffSuppress::EmptyObject)
                .with_description("The ID of the billing group this project is assigned to."),
        )
        .attribute(
            AttributeSchema::new("tag", types::tag())
                .with_description("Tags are key-value pairs that allow you to categorize projects."),
        )
        .attribute(computed(
            "ca_cert",
            "The CA certificate for the project. This is required for configuring clients that \
             connect to certain services like Kafka.",
        ).sensitive())
        .attribute(computed(
            "payment_method",
            "The payment type used for this project. For example, `card`.",
        ))
        .attribute(computed(
            "available_credits",
            "The number of trial or promotional credits remaining for this project.",
        ))
        .attribute(computed(
            "estimated_balance",
            "The monthly running estimate for this project for the current billing period.",
        ))
}

fn project_path(name: &str) -> String {
    format!("/project/{}", escape(name))
}

fn is_not_project_member(err: &AivenError) -> bool {
    matches!(err, AivenError::Api(e) if e.status == 403 && e.message.contains("Not a project member"))
}

/// Get a project, waiting out the window in which a new project is not yet visible
pub async fn get_project(ctx: &HandlerContext<'_>, name: &str) -> Result<Project> {
    let path = project_path(name);
    let path = path.as_str();
    let body = retry(
        MEMBERSHIP_TIMEOUT.min(ctx.timeouts.read),
        ctx.retry_interval(),
        is_not_project_member,
        || async move { ctx.client.get(path).await },
    )
    .await?;
    Ok(serde_json::from_value(take_field(body, "project")?)?)
}

async fn get_ca_cert(client: &AivenClient, name: &str) -> Option<String> {
    match client
        .get(&format!("{}/kms/ca", project_path(name)))
        .await
    {
        Ok(body) => body["certificate"].as_str().map(str::to_string),
        Err(e) => {
            log::debug!("no CA certificate for project {}: {}", name, e);
            None
        }
    }
}

pub async fn project_attributes(ctx: &HandlerContext<'_>, name: &str) -> Result<Attributes> {
    let project = get_project(ctx, name).await?;
    let view = ProjectView {
        project: &project.project_name,
        account_id: project.account_id.as_deref(),
        parent_id: project.account_id.as_deref(),
        default_cloud: project.default_cloud.as_deref(),
        billing_group: project.billing_group_id.as_deref(),
        available_credits: project.available_credits.as_deref(),
        estimated_balance: project.estimated_balance.as_deref(),
        payment_method: project.payment_method.as_deref(),
        technical_emails: project.tech_emails.iter().map(|e| e.email.as_str()).collect(),
        ca_cert: get_ca_cert(ctx.client, &project.project_name).await,
    };

    let mut attrs = resource_data_set(&schema(), name, &view, &[])?;
    if !project.tags.is_empty() {
        attrs.insert("tag".to_string(), tags_to_value(&project.tags));
    }
    Ok(attrs)
}

async fn billing_group_projects(client: &AivenClient, group_id: &str) -> Result<Vec<String>> {
    let body = client
        .get(&format!("/billing-group/{}/projects", escape(group_id)))
        .await?;
    Ok(body["projects"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|p| p["project_name"].as_str().map(str::to_string))
        .collect())
}

async fn assign_to_billing_group(client: &AivenClient, project: &str, group_id: &str) -> Result<()> {
    log::debug!(
        "Associating project `{}` with the billing group `{}`",
        project,
        group_id
    );

    let assigned = billing_group_projects(client, group_id).await?;
    if assigned.iter().any(|p| p == project) {
        return Ok(());
    }

    client
        .post(
            &format!("/billing-group/{}/projects-assign", escape(group_id)),
            &serde_json::json!({ "projects_names": [project] }),
        )
        .await?;
    Ok(())
}

/// Put the new project into the billing group of the project it was copied from
async fn copy_billing_group(client: &AivenClient, source: &str, project: &str) -> Result<()> {
    let body = client.get("/billing-group").await?;
    let groups = body["billing_groups"].as_array().cloned().unwrap_or_default();

    for group in groups {
        let Some(group_id) = group["billing_group_id"].as_str() else {
            continue;
        };
        if billing_group_projects(client, group_id)
            .await?
            .iter()
            .any(|p| p == source)
        {
            log::debug!("Source project `{}` has billing group `{}`", source, group_id);
            return assign_to_billing_group(client, project, group_id).await;
        }
    }

    log::debug!("Source project `{}` is not associated to any billing group", source);
    Ok(())
}

fn tech_emails(attrs: &Attributes) -> Vec<TechEmail> {
    flatten_to_string(attrs.get("technical_emails"))
        .into_iter()
        .map(|email| TechEmail { email })
        .collect()
}

fn account_id(attrs: &Attributes) -> Option<&str> {
    get_str(attrs, "parent_id").or_else(|| get_str(attrs, "account_id"))
}

pub struct ProjectHandler;

#[async_trait]
impl ResourceHandler for ProjectHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let name = require_str(attrs, "project")?;
        let copy_from = get_str(attrs, "copy_from_project");

        // An empty list would wipe the contacts copied from the source project
        let emails = tech_emails(attrs);
        let emails = (!emails.is_empty() || copy_from.is_some()).then_some(emails);

        let request = CreateProjectRequest {
            project: name,
            account_id: account_id(attrs),
            billing_group_id: get_str(attrs, "billing_group"),
            cloud: get_str(attrs, "default_cloud"),
            copy_from_project: copy_from,
            use_source_project_billing_group: matches!(
                attrs.get("use_source_project_billing_group"),
                Some(Value::Bool(_))
            )
            .then(|| get_bool(attrs, "use_source_project_billing_group")),
            add_account_owners_admin_access: true,
            tags: get_tags(attrs, "tag")?,
            tech_emails: emails,
        };
        ctx.client.post("/project", &request).await?;

        if get_str(attrs, "billing_group").is_none()
            && let Some(source) = copy_from
        {
            copy_billing_group(ctx.client, source, name).await?;
        }

        Ok(name.to_string())
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        project_attributes(ctx, id).await
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let name = require_str(attrs, "project")?;
        let request = UpdateProjectRequest {
            project_name: name,
            account_id: account_id(attrs),
            cloud: get_str(attrs, "default_cloud"),
            add_account_owners_admin_access: true,
            tags: get_tags(attrs, "tag")?,
            tech_emails: tech_emails(attrs),
        };
        let body = ctx.client.put(&project_path(id), &request).await?;
        let project: Project = serde_json::from_value(take_field(body, "project")?)?;

        if let Some(group_id) = get_str(attrs, "billing_group")
            && project.billing_group_id.as_deref() != Some(group_id)
        {
            assign_to_billing_group(ctx.client, &project.project_name, group_id).await?;
        }

        Ok(project.project_name)
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        omit_not_found(ctx.client.delete(&project_path(id)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{TestEnv, s};
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project_json(name: &str, billing_group: &str) -> serde_json::Value {
        json!({
            "project": {
                "project_name": name,
                "account_id": "a28707e316df",
                "default_cloud": "google-europe-west1",
                "billing_group_id": billing_group,
                "estimated_balance": "12.50",
                "payment_method": "card",
                "tags": {"team": "data"},
                "tech_emails": [{"email": "ops@acme.io"}]
            }
        })
    }

    #[tokio::test]
    async fn read_waits_for_membership_and_fetches_ca() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"message": "Not a project member"})),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json("acme", "bg-1")))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/kms/ca"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"certificate": "-----BEGIN"})),
            )
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = ProjectHandler.read(&env.ctx(), "acme").await.unwrap();
        assert_eq!(attrs.get("project"), Some(&s("acme")));
        assert_eq!(attrs.get("billing_group"), Some(&s("bg-1")));
        assert_eq!(attrs.get("ca_cert"), Some(&s("-----BEGIN")));
        assert_eq!(
            attrs.get("technical_emails"),
            Some(&Value::List(vec![s("ops@acme.io")]))
        );
        assert!(attrs.contains_key("tag"));
        assert!(!attrs.contains_key("available_credits"));
    }

    #[tokio::test]
    async fn create_copies_billing_group_from_source() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/project"))
            .and(body_partial_json(json!({
                "project": "acme-staging",
                "copy_from_project": "acme",
                "tech_emails": []
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(project_json("acme-staging", "")))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/billing-group"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "billing_groups": [{"billing_group_id": "bg-0"}, {"billing_group_id": "bg-1"}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/billing-group/bg-0/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": []})))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/billing-group/bg-1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [{"project_name": "acme"}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/billing-group/bg-1/projects-assign"))
            .and(body_json(json!({"projects_names": ["acme-staging"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = HashMap::from([
            ("project".to_string(), s("acme-staging")),
            ("copy_from_project".to_string(), s("acme")),
        ]);
        let id = ProjectHandler.create(&env.ctx(), &attrs).await.unwrap();
        assert_eq!(id, "acme-staging");
    }

    #[tokio::test]
    async fn update_renames_project() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/project/acme"))
            .and(body_partial_json(json!({"project_name": "acme-prod", "tech_emails": []})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(project_json("acme-prod", "bg-1")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = HashMap::from([
            ("project".to_string(), s("acme-prod")),
            ("billing_group".to_string(), s("bg-1")),
        ]);
        let id = ProjectHandler
            .update(&env.ctx(), "acme", &attrs)
            .await
            .unwrap();
        assert_eq!(id, "acme-prod");
    }
}
