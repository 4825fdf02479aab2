//! static_ip - static IP addresses reserved for a project
//!
//! ID: `project/static_ip_address_id`. An address in the `assigned` state is
//! bound to a node and cannot be deleted until the node is recycled.

use aivenctl_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, ApiError, Result, is_critical, is_not_found};
use crate::schemautil::{build_resource_id, require_str, resource_data_set, resource_id_keys, split2};

pub const TYPE_NAME: &str = "static_ip";

const WAITING: &str = "waiting";
const CREATING: &str = "creating";
const CREATED: &str = "created";
const AVAILABLE: &str = "available";
const ASSIGNED: &str = "assigned";

pub fn schema() -> ResourceSchema {
    let computed = |name: &str, desc: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .computed()
            .with_description(desc)
    };

    ResourceSchema::new(TYPE_NAME)
        .with_description(
            "Creates and deletes static IPs. A static IP in the `assigned` state is bound to \
             the node it is assigned to and cannot be deleted or dissociated until the node is \
             recycled.",
        )
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
                .with_description("Specifies the cloud that the static ip belongs to."),
        )
        .attribute(computed("ip_address", "The address of the static ip"))
        .attribute(computed(
            "service_name",
            "The service name the static ip is associated with.",
        ))
        .attribute(computed("state", "The state the static ip is in."))
        .attribute(computed(
            "static_ip_address_id",
            "The static ip id of the resource. Should be used as a reference elsewhere.",
        ))
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StaticIp {
    pub static_ip_address_id: String,
    pub cloud_name: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub service_name: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
struct CreateStaticIpRequest<'a> {
    cloud_name: &'a str,
}

fn static_ips_path(project: &str) -> String {
    format!("/project/{}/static-ips", escape(project))
}

fn static_ip_path(project: &str, id: &str) -> String {
    format!("{}/{}", static_ips_path(project), escape(id))
}

pub async fn list_static_ips(client: &AivenClient, project: &str) -> Result<Vec<StaticIp>> {
    let body = client.get(&static_ips_path(project)).await?;
    Ok(serde_json::from_value(take_field(body, "static_ips")?)?)
}

/// Static IPs are looked up through the project's list
pub async fn get_static_ip(client: &AivenClient, project: &str, id: &str) -> Result<StaticIp> {
    list_static_ips(client, project)
        .await?
        .into_iter()
        .find(|ip| ip.static_ip_address_id == id)
        .ok_or_else(|| ApiError::not_found(format!("static ip {:?} not found", id)).into())
}

pub fn static_ip_attributes(id: &str, ip: &StaticIp) -> Result<Attributes> {
    resource_data_set(&schema(), id, ip, &[resource_id_keys(&["project", "static_ip_address_id"])])
}

pub struct StaticIpHandler;

#[async_trait]
impl ResourceHandler for StaticIpHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let request = CreateStaticIpRequest {
            cloud_name: require_str(attrs, "cloud_name")?,
        };
        let body = ctx.client.post(&static_ips_path(project), &request).await?;
        let created: StaticIp = serde_json::from_value(body)?;
        let ip_id = created.static_ip_address_id.as_str();

        ctx.state_change(&[WAITING, CREATING], &[CREATED], ctx.timeouts.create)
            .wait(|| async move {
                match get_static_ip(ctx.client, project, ip_id).await {
                    Ok(ip) => {
                        log::debug!("static ip {} is in state {}", ip_id, ip.state);
                        Ok(Some(((), ip.state)))
                    }
                    Err(e) if is_not_found(&e) => {
                        log::debug!("static ip {} not found in project", ip_id);
                        Ok(Some(((), WAITING.to_string())))
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        Ok(build_resource_id(&[project, ip_id]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, ip_id) = split2(id)?;
        let ip = get_static_ip(ctx.client, &project, &ip_id).await?;
        static_ip_attributes(id, &ip)
    }

    async fn update(&self, _ctx: &HandlerContext<'_>, _id: &str, _attrs: &Attributes) -> Result<String> {
        Err(AivenError::Config(
            "static_ip attributes cannot be changed in place".to_string(),
        ))
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, ip_id) = split2(id)?;
        let ip = match get_static_ip(ctx.client, &project, &ip_id).await {
            Ok(ip) => ip,
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e),
        };

        match ip.state.as_str() {
            ASSIGNED => {
                return Err(AivenError::Config(format!(
                    "static ip {} is assigned to a node and cannot be deleted until the node is recycled",
                    ip_id
                )));
            }
            AVAILABLE => {
                ctx.client
                    .delete(&format!("{}/association", static_ip_path(&project, &ip_id)))
                    .await?;
            }
            _ => {}
        }

        match ctx.client.delete(&static_ip_path(&project, &ip_id)).await {
            Err(e) if is_critical(&e) => Err(e),
            _ => Ok(()),
        }
    }
}
