//! VPC peering connections between a project VPC and a VPC in the user's cloud
//!
//! Two resource types share this implementation:
//!
//! - `vpc_peering_connection` - cloud agnostic field names
//! - `aws_vpc_peering_connection` - the same connection with AWS field names
//!
//! The API has no endpoint for a single connection; it is looked up in the
//! `peering_connections` list of its VPC.

use std::collections::BTreeMap;

use aivenctl_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::project_vpc::{get_vpc, vpc_path};
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape};
use crate::errors::{AivenError, ApiError, Result, is_critical, is_not_found, omit_not_found};
use crate::schemautil::{
    build_resource_id, flatten_to_string, get_str, rename_aliases_reverse, require_str,
    resource_data_set, split2, unescape,
};

const CREATE_PENDING: &[&str] = &["APPROVED"];
const CREATE_TARGET: &[&str] = &[
    "ACTIVE",
    "REJECTED_BY_PEER",
    "PENDING_PEER",
    "INVALID_SPECIFICATION",
    "DELETING",
    "DELETED",
    "DELETED_BY_PEER",
];
const DELETE_PENDING: &[&str] = &[
    "ACTIVE",
    "APPROVED",
    "APPROVED_PEER_REQUESTED",
    "DELETING",
    "INVALID_SPECIFICATION",
    "PENDING_PEER",
    "REJECTED_BY_PEER",
    "DELETED_BY_PEER",
];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PeeringConnection {
    pub peer_cloud_account: String,
    pub peer_vpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_region: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_info: Option<Map<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_peer_network_cidrs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreatePeeringRequest<'a> {
    peer_cloud_account: &'a str,
    peer_vpc: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer_region: Option<&'a str>,
    user_peer_network_cidrs: Vec<String>,
}

/// Attribute view of a connection, named after the generic resource
#[derive(Debug, Serialize)]
struct PeeringView<'a> {
    vpc_id: String,
    peer_cloud_account: &'a str,
    peer_vpc: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer_region: Option<&'a str>,
    state: &'a str,
    state_info: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peering_connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_peer_network_cidrs: Option<&'a [String]>,
}

/// `project/vpc_id/peer_cloud_account/peer_vpc[/peer_region]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringId {
    pub project: String,
    pub vpc_id: String,
    pub peer_cloud_account: String,
    pub peer_vpc: String,
    pub peer_region: Option<String>,
}

impl PeeringId {
    pub fn parse(id: &str) -> Result<Self> {
        let chunks: Vec<String> = id
            .split('/')
            .map(|c| unescape(c).ok_or_else(|| AivenError::InvalidId(id.to_string())))
            .collect::<Result<_>>()?;

        if !(4..=5).contains(&chunks.len()) {
            return Err(AivenError::InvalidId(format!(
                "expected unix path-like string with 4-5 chunks, got {}",
                chunks.len()
            )));
        }

        let mut chunks = chunks.into_iter();
        let mut next = || chunks.next().unwrap_or_default();
        Ok(Self {
            project: next(),
            vpc_id: next(),
            peer_cloud_account: next(),
            peer_vpc: next(),
            peer_region: Some(next()).filter(|r| !r.is_empty()),
        })
    }

    pub fn to_id(&self) -> String {
        let mut parts = vec![
            self.project.as_str(),
            self.vpc_id.as_str(),
            self.peer_cloud_account.as_str(),
            self.peer_vpc.as_str(),
        ];
        if let Some(region) = &self.peer_region {
            parts.push(region);
        }
        build_resource_id(&parts)
    }

    fn delete_path(&self) -> String {
        let mut path = format!(
            "{}/peering-connections/peer-accounts/{}/peer-vpcs/{}",
            vpc_path(&self.project, &self.vpc_id),
            escape(&self.peer_cloud_account),
            escape(&self.peer_vpc)
        );
        if let Some(region) = &self.peer_region {
            path.push_str(&format!("/peer-regions/{}", escape(region)));
        }
        path
    }
}

/// Find a connection in its VPC; a missing connection is a 404
pub async fn get_peering(client: &AivenClient, id: &PeeringId) -> Result<PeeringConnection> {
    let vpc = get_vpc(client, &id.project, &id.vpc_id).await?;
    vpc.peering_connections
        .into_iter()
        .find(|pc| {
            pc.peer_cloud_account == id.peer_cloud_account
                && pc.peer_vpc == id.peer_vpc
                && id
                    .peer_region
                    .as_ref()
                    .is_none_or(|region| pc.peer_region.as_ref() == Some(region))
        })
        .ok_or_else(|| ApiError::not_found("Peering connection not found").into())
}

/// Message first, then every other entry on its own line
pub fn state_info_to_string(info: Option<&Map<String, JsonValue>>) -> String {
    let Some(info) = info else {
        return String::new();
    };

    let mut out = match info.get("message") {
        Some(JsonValue::String(m)) => m.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let rest: BTreeMap<_, _> = info.iter().filter(|(k, _)| k.as_str() != "message").collect();
    for (k, v) in rest {
        match v {
            JsonValue::String(s) => out.push_str(&format!("\n {:?}:{:?}", k, s)),
            other => out.push_str(&format!("\n {:?}:`{}`", k, other)),
        }
    }
    out
}

fn state_info_to_map(info: Option<&Map<String, JsonValue>>) -> BTreeMap<String, String> {
    info.into_iter()
        .flatten()
        .map(|(k, v)| {
            let v = match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

/// Anything but ACTIVE needs the user's attention; only PENDING_PEER is not an error
fn check_state(pc: &PeeringConnection) -> Result<()> {
    let info = state_info_to_string(pc.state_info.as_ref());
    let message = match pc.state.as_str() {
        "ACTIVE" => return Ok(()),
        "PENDING_PEER" => {
            log::warn!(
                "Aiven platform has created a connection to the specified peer successfully in \
                 the cloud, but the connection is not active until the user completes the setup \
                 in their cloud account. The steps needed in the user cloud account depend on \
                 the used cloud provider. Find more in the state info: {}",
                info
            );
            return Ok(());
        }
        "DELETED" => "A user has deleted the peering connection through aivenctl, or Aiven Web \
                      Console or directly via Aiven API. There are no transitions from this state"
            .to_string(),
        "DELETED_BY_PEER" => "A user deleted the peering cloud resource in their account. There \
                              are no transitions from this state"
            .to_string(),
        "REJECTED_BY_PEER" => format!(
            "VPC peering connection request was rejected, state info: {}",
            info
        ),
        "INVALID_SPECIFICATION" => format!(
            "VPC peering connection cannot be created, more in the state info: {}",
            info
        ),
        other => format!("Unknown VPC peering connection state: {}", other),
    };
    Err(AivenError::Other(message))
}

/// Attribute names for one flavour of the resource
#[derive(Debug, Clone, Copy)]
struct PeerFields {
    type_name: &'static str,
    account: &'static str,
    vpc: &'static str,
    region: &'static str,
    connection_id: &'static str,
}

const GENERIC: PeerFields = PeerFields {
    type_name: "vpc_peering_connection",
    account: "peer_cloud_account",
    vpc: "peer_vpc",
    region: "peer_region",
    connection_id: "peering_connection_id",
};

const AWS: PeerFields = PeerFields {
    type_name: "aws_vpc_peering_connection",
    account: "aws_account_id",
    vpc: "aws_vpc_id",
    region: "aws_vpc_region",
    connection_id: "aws_vpc_peering_connection_id",
};

pub struct VpcPeeringHandler {
    fields: PeerFields,
}

impl VpcPeeringHandler {
    pub fn generic() -> Self {
        Self { fields: GENERIC }
    }

    pub fn aws() -> Self {
        Self { fields: AWS }
    }

    fn is_aws(&self) -> bool {
        self.fields.type_name == AWS.type_name
    }

    fn aliases(&self) -> [(&'static str, &'static str); 4] {
        [
            (self.fields.account, GENERIC.account),
            (self.fields.vpc, GENERIC.vpc),
            (self.fields.region, GENERIC.region),
            (self.fields.connection_id, GENERIC.connection_id),
        ]
    }

    fn attributes(&self, id: &PeeringId, pc: &PeeringConnection) -> Result<Attributes> {
        let state_info = state_info_to_map(pc.state_info.as_ref());
        let view = PeeringView {
            vpc_id: build_resource_id(&[&id.project, &id.vpc_id]),
            peer_cloud_account: &pc.peer_cloud_account,
            peer_vpc: &pc.peer_vpc,
            peer_region: pc.peer_region.as_deref(),
            state: &pc.state,
            peering_connection_id: state_info.get("aws_vpc_peering_connection_id").cloned(),
            state_info,
            user_peer_network_cidrs: Some(pc.user_peer_network_cidrs.as_slice())
                .filter(|cidrs| !cidrs.is_empty()),
        };
        let aliases = self.aliases();
        resource_data_set(
            &self.schema(),
            &id.to_id(),
            &view,
            &[rename_aliases_reverse(&aliases)],
        )
    }
}

#[async_trait]
impl ResourceHandler for VpcPeeringHandler {
    fn type_name(&self) -> &'static str {
        self.fields.type_name
    }

    fn schema(&self) -> ResourceSchema {
        let f = &self.fields;
        let cloud = if self.is_aws() { "AWS" } else { "peer cloud" };

        let mut schema = ResourceSchema::new(f.type_name)
            .with_description(format!(
                "Creates and manages a{} VPC peering connection with an Aiven VPC.",
                if self.is_aws() { "n AWS" } else { "" }
            ))
            .attribute(
                AttributeSchema::new("vpc_id", types::project_scoped_id())
                    .required()
                    .force_new()
                    .with_description("The ID of the Aiven VPC, as `project/vpc_id`."),
            )
            .attribute(
                AttributeSchema::new(f.account, AttributeType::String)
                    .required()
                    .force_new()
                    .with_description(format!("{} account ID.", cloud)),
            )
            .attribute(
                AttributeSchema::new(f.vpc, AttributeType::String)
                    .required()
                    .force_new()
                    .with_description(format!("{} VPC ID.", cloud)),
            )
            .attribute(
                AttributeSchema::new("state", AttributeType::String)
                    .computed()
                    .with_description("The state of the peering connection."),
            )
            .attribute(
                AttributeSchema::new("state_info", AttributeType::Map(Box::new(AttributeType::String)))
                    .computed()
                    .with_description("State-specific help or error information."),
            )
            .attribute(
                AttributeSchema::new(f.connection_id, AttributeType::String)
                    .computed()
                    .with_description("The ID of the cloud provider's peering connection."),
            );

        let region = AttributeSchema::new(f.region, AttributeType::String)
            .force_new()
            .with_description("The region of the peered VPC, if different from the Aiven VPC region.");
        if self.is_aws() {
            schema = schema.attribute(region.required());
        } else {
            schema = schema.attribute(region.optional_computed()).attribute(
                AttributeSchema::new(
                    "user_peer_network_cidrs",
                    AttributeType::List(Box::new(types::cidr())),
                )
                .force_new()
                .with_description("List of private IPv4 ranges to route through the peering connection."),
            );
        }
        schema
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let (project, vpc_id) = split2(require_str(attrs, "vpc_id")?)?;
        let mut id = PeeringId {
            project,
            vpc_id,
            peer_cloud_account: require_str(attrs, self.fields.account)?.to_string(),
            peer_vpc: require_str(attrs, self.fields.vpc)?.to_string(),
            peer_region: get_str(attrs, self.fields.region).map(str::to_string),
        };

        match get_peering(ctx.client, &id).await {
            Ok(_) => {
                return Err(AivenError::Other(format!(
                    "{} already exists and cannot be created",
                    self.fields.type_name
                )));
            }
            Err(e) if is_critical(&e) => return Err(e),
            Err(_) => {}
        }

        let request = CreatePeeringRequest {
            peer_cloud_account: &id.peer_cloud_account,
            peer_vpc: &id.peer_vpc,
            peer_region: id.peer_region.as_deref(),
            user_peer_network_cidrs: flatten_to_string(attrs.get("user_peer_network_cidrs")),
        };
        ctx.client
            .post(
                &format!("{}/peering-connections", vpc_path(&id.project, &id.vpc_id)),
                &request,
            )
            .await?;

        let lookup = &id;
        let pc = ctx
            .state_change(CREATE_PENDING, CREATE_TARGET, ctx.timeouts.create)
            .wait(|| async move {
                let pc = get_peering(ctx.client, lookup).await?;
                let state = pc.state.clone();
                Ok(Some((pc, state)))
            })
            .await?;

        if id.peer_region.is_none() {
            id.peer_region = pc.peer_region.clone().filter(|r| !r.is_empty());
        }
        let resource_id = id.to_id();

        if let Err(err) = check_state(&pc) {
            if let Err(delete_err) = self.delete(ctx, &resource_id).await {
                log::error!(
                    "failed to delete VPC peering connection {}: {}",
                    resource_id,
                    delete_err
                );
            }
            return Err(err);
        }

        Ok(resource_id)
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let peering_id = PeeringId::parse(id)?;
        let pc = get_peering(ctx.client, &peering_id).await?;
        self.attributes(&peering_id, &pc)
    }

    async fn update(&self, _ctx: &HandlerContext<'_>, _id: &str, _attrs: &Attributes) -> Result<String> {
        Err(AivenError::Config(format!(
            "{} attributes cannot be changed in place",
            self.fields.type_name
        )))
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let peering_id = PeeringId::parse(id)?;
        omit_not_found(ctx.client.delete(&peering_id.delete_path()).await)?;

        let lookup = &peering_id;
        ctx.state_change(DELETE_PENDING, &["DELETED"], ctx.timeouts.delete)
            .wait(|| async move {
                match get_peering(ctx.client, lookup).await {
                    Ok(pc) => {
                        let state = pc.state;
                        Ok(Some(((), state)))
                    }
                    Err(e) if is_not_found(&e) => Ok(Some(((), "DELETED".to_string()))),
                    Err(e) => Err(e),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{TestEnv, s};
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VPC_PATH: &str = "/project/acme/vpcs/f8a7c1";

    fn vpc_with(peerings: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "project_vpc_id": "f8a7c1",
            "cloud_name": "aws-eu-west-1",
            "network_cidr": "10.0.0.0/24",
            "state": "ACTIVE",
            "peering_connections": peerings
        }))
    }

    fn aws_peering(state: &str) -> serde_json::Value {
        json!({
            "peer_cloud_account": "123456789012",
            "peer_vpc": "vpc-0abc",
            "peer_region": "eu-west-1",
            "state": state,
            "state_info": {
                "message": "Peering connection is waiting for acceptance",
                "aws_vpc_peering_connection_id": "pcx-42"
            }
        })
    }

    fn aws_attrs() -> HashMap<String, aivenctl_core::resource::Value> {
        HashMap::from([
            ("vpc_id".to_string(), s("acme/f8a7c1")),
            ("aws_account_id".to_string(), s("123456789012")),
            ("aws_vpc_id".to_string(), s("vpc-0abc")),
            ("aws_vpc_region".to_string(), s("eu-west-1")),
        ])
    }

    #[test]
    fn peering_id_accepts_four_or_five_chunks() {
        let id = PeeringId::parse("acme/f8a7c1/123456789012/vpc-0abc").unwrap();
        assert_eq!(id.peer_region, None);
        assert_eq!(id.to_id(), "acme/f8a7c1/123456789012/vpc-0abc");

        let id = PeeringId::parse("acme/f8a7c1/123456789012/vpc-0abc/eu-west-1").unwrap();
        assert_eq!(id.peer_region.as_deref(), Some("eu-west-1"));
        assert_eq!(
            id.delete_path(),
            "/project/acme/vpcs/f8a7c1/peering-connections/peer-accounts/123456789012\
             /peer-vpcs/vpc-0abc/peer-regions/eu-west-1"
        );

        let err = PeeringId::parse("acme/f8a7c1/123456789012").unwrap_err();
        assert!(
            err.to_string()
                .contains("expected unix path-like string with 4-5 chunks, got 3")
        );
    }

    #[test]
    fn state_info_puts_message_first() {
        let info = json!({"message": "rejected", "reason": "wrong account", "code": 7});
        let rendered = state_info_to_string(info.as_object());
        assert_eq!(rendered, "rejected\n \"code\":`7`\n \"reason\":\"wrong account\"");
        assert_eq!(state_info_to_string(None), "");
    }

    #[test]
    fn pending_peer_is_not_an_error() {
        let pc = PeeringConnection {
            state: "PENDING_PEER".to_string(),
            ..Default::default()
        };
        assert!(check_state(&pc).is_ok());

        let pc = PeeringConnection {
            state: "SOMETHING_ELSE".to_string(),
            ..Default::default()
        };
        assert_eq!(
            check_state(&pc).unwrap_err().to_string(),
            "Unknown VPC peering connection state: SOMETHING_ELSE"
        );
    }

    #[test]
    fn generic_and_aws_schemas_differ_in_field_names() {
        let generic = VpcPeeringHandler::generic().schema();
        assert!(generic.get("peer_cloud_account").is_some());
        assert!(generic.get("user_peer_network_cidrs").is_some());

        let aws = VpcPeeringHandler::aws().schema();
        assert!(aws.get("aws_account_id").is_some());
        assert!(aws.get("aws_vpc_region").is_some_and(|a| a.required));
        assert!(aws.get("user_peer_network_cidrs").is_none());
    }

    #[tokio::test]
    async fn aws_create_waits_for_active_and_reads_connection_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([])))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([aws_peering("APPROVED")])))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([aws_peering("ACTIVE")])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/project/acme/vpcs/f8a7c1/peering-connections"))
            .and(body_partial_json(json!({
                "peer_cloud_account": "123456789012",
                "peer_vpc": "vpc-0abc",
                "peer_region": "eu-west-1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(aws_peering("APPROVED")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let handler = VpcPeeringHandler::aws();
        let id = handler.create(&env.ctx(), &aws_attrs()).await.unwrap();
        assert_eq!(id, "acme/f8a7c1/123456789012/vpc-0abc/eu-west-1");

        let attrs = handler.read(&env.ctx(), &id).await.unwrap();
        assert_eq!(attrs.get("vpc_id"), Some(&s("acme/f8a7c1")));
        assert_eq!(attrs.get("aws_account_id"), Some(&s("123456789012")));
        assert_eq!(attrs.get("aws_vpc_region"), Some(&s("eu-west-1")));
        assert_eq!(attrs.get("aws_vpc_peering_connection_id"), Some(&s("pcx-42")));
        assert_eq!(attrs.get("state"), Some(&s("ACTIVE")));
        assert!(!attrs.contains_key("peer_cloud_account"));
    }

    #[tokio::test]
    async fn existing_connection_is_not_created_again() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([aws_peering("ACTIVE")])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let err = VpcPeeringHandler::aws()
            .create(&env.ctx(), &aws_attrs())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "aws_vpc_peering_connection already exists and cannot be created"
        );
    }

    #[tokio::test]
    async fn rejected_connection_is_deleted_after_create() {
        let mock_server = MockServer::start().await;
        let mut rejected = aws_peering("REJECTED_BY_PEER");
        rejected["state_info"] = json!({"message": "Peering rejected by owner"});

        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([])))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([rejected])))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/project/acme/vpcs/f8a7c1/peering-connections"))
            .respond_with(ResponseTemplate::new(201).set_body_json(aws_peering("APPROVED")))
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(
                "/project/acme/vpcs/f8a7c1/peering-connections/peer-accounts/123456789012\
                 /peer-vpcs/vpc-0abc/peer-regions/eu-west-1",
            ))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let err = VpcPeeringHandler::aws()
            .create(&env.ctx(), &aws_attrs())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "VPC peering connection request was rejected, state info: Peering rejected by owner"
        );
    }

    #[tokio::test]
    async fn delete_tolerates_missing_connection() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(VPC_PATH))
            .respond_with(vpc_with(json!([])))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        VpcPeeringHandler::generic()
            .delete(&env.ctx(), "acme/f8a7c1/123456789012/vpc-0abc")
            .await
            .unwrap();
    }
}
