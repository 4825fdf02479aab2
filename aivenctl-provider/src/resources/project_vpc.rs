//! project_vpc - a VPC owned by a project in a single cloud region

use aivenctl_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::vpc_peering::PeeringConnection;
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, Result, is_not_found};
use crate::schemautil::{
    build_resource_id, require_str, resource_data_set, resource_id_keys, split2,
};

pub const TYPE_NAME: &str = "project_vpc";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Vpc {
    pub project_vpc_id: String,
    pub cloud_name: String,
    pub network_cidr: String,
    pub state: String,
    #[serde(default)]
    pub peering_connections: Vec<PeeringConnection>,
}

#[derive(Debug, Serialize)]
struct CreateVpcRequest<'a> {
    cloud_name: &'a str,
    network_cidr: &'a str,
    peering_connections: Vec<PeeringConnection>,
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages a VPC for an Aiven project.")
        .attribute(
            AttributeSchema::new("project", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the project this resource belongs to."),
        )
        .attribute(
            AttributeSchema::new("cloud_name", AttributeType::String)
                .required()
                .force_new()
                .with_description(
                    "The cloud provider and region where the service is hosted in the format \
                     `CLOUD_PROVIDER-REGION_NAME`. For example, `google-europe-west1`.",
                ),
        )
        .attribute(
            AttributeSchema::new("network_cidr", types::cidr())
                .required()
                .force_new()
                .with_description("Network address range used by the VPC, e.g. `192.168.0.0/24`."),
        )
        .attribute(
            AttributeSchema::new("state", AttributeType::String)
                .computed()
                .with_description("State of the VPC (APPROVED, ACTIVE, DELETING, DELETED)."),
        )
}

pub fn vpc_path(project: &str, vpc_id: &str) -> String {
    format!("/project/{}/vpcs/{}", escape(project), escape(vpc_id))
}

pub async fn get_vpc(client: &AivenClient, project: &str, vpc_id: &str) -> Result<Vpc> {
    let body = client.get(&vpc_path(project, vpc_id)).await?;
    Ok(serde_json::from_value(body)?)
}

pub async fn list_vpcs(client: &AivenClient, project: &str) -> Result<Vec<Vpc>> {
    let body = client
        .get(&format!("/project/{}/vpcs", escape(project)))
        .await?;
    Ok(serde_json::from_value(take_field(body, "vpcs")?)?)
}

/// Attributes of a VPC, with `project` taken from the `project/vpc_id` ID
pub fn vpc_attributes(id: &str, vpc: &Vpc) -> Result<Attributes> {
    resource_data_set(
        &schema(),
        id,
        vpc,
        &[resource_id_keys(&["project", "project_vpc_id"])],
    )
}

pub struct ProjectVpcHandler;

#[async_trait]
impl ResourceHandler for ProjectVpcHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let request = CreateVpcRequest {
            cloud_name: require_str(attrs, "cloud_name")?,
            network_cidr: require_str(attrs, "network_cidr")?,
            peering_connections: Vec::new(),
        };

        let body = ctx
            .client
            .post(&format!("/project/{}/vpcs", escape(project)), &request)
            .await?;
        let vpc: Vpc = serde_json::from_value(body)?;

        // Services cannot be placed in the VPC until it is active
        let vpc_id = vpc.project_vpc_id.as_str();
        ctx.state_change(
            &["APPROVED", "DELETING", "DELETED"],
            &["ACTIVE"],
            ctx.timeouts.create,
        )
        .wait(|| async move {
            let vpc = get_vpc(ctx.client, project, vpc_id).await?;
            log::debug!(
                "Got {} state while waiting for VPC connection to be ACTIVE",
                vpc.state
            );
            let state = vpc.state.clone();
            Ok(Some((vpc, state)))
        })
        .await?;

        Ok(build_resource_id(&[project, vpc_id]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, vpc_id) = split2(id)?;
        let vpc = get_vpc(ctx.client, &project, &vpc_id).await?;
        vpc_attributes(id, &vpc)
    }

    async fn update(&self, _ctx: &HandlerContext<'_>, _id: &str, _attrs: &Attributes) -> Result<String> {
        Err(AivenError::Config(
            "project_vpc attributes cannot be changed in place".to_string(),
        ))
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, vpc_id) = split2(id)?;
        let (project, vpc_id) = (project.as_str(), vpc_id.as_str());
        let path = vpc_path(project, vpc_id);
        let path = path.as_str();

        ctx.state_change(
            &["APPROVED", "DELETING", "ACTIVE"],
            &["DELETED"],
            ctx.timeouts.delete,
        )
        .wait(|| async move {
            let vpc = match get_vpc(ctx.client, project, vpc_id).await {
                Ok(vpc) => vpc,
                Err(e) if is_not_found(&e) => return Ok(Some(((), "DELETED".to_string()))),
                Err(e) => return Err(e),
            };

            if vpc.state != "DELETING" && vpc.state != "DELETED" {
                match ctx.client.delete(path).await {
                    Ok(()) => {}
                    Err(e) if is_not_found(&e) => return Ok(Some(((), "DELETED".to_string()))),
                    // Services are still migrating out of the VPC
                    Err(e) if e.status() == Some(409) => {}
                    Err(e) => return Err(e),
                }
            }

            log::debug!(
                "Got {} state while waiting for VPC connection to be DELETED",
                vpc.state
            );
            Ok(Some(((), vpc.state)))
        })
        .await
    }
}
