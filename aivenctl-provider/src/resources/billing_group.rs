//! billing_group - invoicing details shared by a set of projects

use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{Result, omit_not_found};
use crate::schemautil::{
    flatten_to_string, get_str, rename_aliases_reverse, require_str, resource_data_set,
};

pub const TYPE_NAME: &str = "billing_group";

const ALIASES: &[(&str, &str)] = &[("name", "billing_group_name")];

/// Optional string fields sent and read under the same name
const TEXT_FIELDS: &[(&str, &str)] = &[
    ("vat_id", "The VAT identification number for your company."),
    (
        "billing_currency",
        "Billing currency for the billing group. Supported currencies are: AUD, CAD, CHF, DKK, \
         EUR, GBP, JPY, NOK, NZD, SEK, SGD, and USD.",
    ),
    (
        "billing_extra_text",
        "Additional information to include on your invoice (for example, a reference number).",
    ),
    ("company", "Your company name."),
    ("country_code", "Two-letter country code."),
    ("city", "City, district, suburb, town, or village."),
    ("zip_code", "Zip or postal code."),
    ("state", "Address state."),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEmail {
    pub email: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BillingGroup {
    pub billing_group_id: String,
    pub billing_group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_extra_text: Option<String>,
    #[serde(default, skip_serializing)]
    pub billing_emails: Vec<BillingEmail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct BillingGroupRequest<'a> {
    billing_group_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vat_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_currency: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_extra_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_emails: Option<Vec<BillingEmail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zip_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    copy_from_billing_group: Option<&'a str>,
}

/// Read-side view; billing emails are flattened to plain strings
#[derive(Debug, Serialize)]
struct BillingGroupView<'a> {
    #[serde(flatten)]
    group: &'a BillingGroup,
    billing_emails: Vec<&'a str>,
    parent_id: Option<&'a str>,
}

pub fn schema() -> ResourceSchema {
    let text = |name: &str, desc: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .diff_suppress(DiffSuppress::EmptyObjectNoChange)
            .with_description(desc)
    };

    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages billing groups and assigns them to projects.")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Name of the billing group."),
        )
        .attributes(TEXT_FIELDS.iter().map(|(name, desc)| text(name, desc)))
        .attribute(text("card_id", "Credit card ID."))
        .attribute(text("account_id", "Account ID.").deprecated(
            "Use parent_id instead. This field will be removed in the next major release.",
        ))
        .attribute(text(
            "parent_id",
            "Link a billing group to an existing organization or account by using its ID.",
        ))
        .attribute(
            AttributeSchema::new("billing_emails", AttributeType::List(Box::new(types::email())))
                .diff_suppress(DiffSuppress::EmptyObjectNoChange)
                .with_description(
                    "Email address of billing contacts. Invoices and other payment notifications \
                     are emailed to all billing contacts.",
                ),
        )
        .attribute(
            AttributeSchema::new("address_lines", AttributeType::List(Box::new(AttributeType::String)))
                .with_description("Address lines 1 and 2. For example, street, PO box, or building."),
        )
        .attribute(
            AttributeSchema::new("copy_from_billing_group", AttributeType::String)
                .diff_suppress(DiffSuppress::CreateOnly)
                .with_description(
                    "ID of the billing group to copy the company name, address, currency, \
                     billing contacts, and extra text from.",
                ),
        )
}

pub async fn get_billing_group(client: &AivenClient, id: &str) -> Result<BillingGroup> {
    let body = client.get(&format!("/billing-group/{}", escape(id))).await?;
    Ok(serde_json::from_value(take_field(body, "billing_group")?)?)
}

fn billing_group_attributes(group: &BillingGroup) -> Result<Attributes> {
    let view = BillingGroupView {
        group,
        billing_emails: group.billing_emails.iter().map(|e| e.email.as_str()).collect(),
        parent_id: group.account_id.as_deref(),
    };
    resource_data_set(
        &schema(),
        &group.billing_group_id,
        &view,
        &[rename_aliases_reverse(ALIASES)],
    )
}

/// Request body shared by create and update; `parent_id` wins over `account_id`
fn request(attrs: &Attributes, creating: bool) -> Result<BillingGroupRequest<'_>> {
    let emails: Vec<BillingEmail> = flatten_to_string(attrs.get("billing_emails"))
        .into_iter()
        .map(|email| BillingEmail { email })
        .collect();
    let address_lines = flatten_to_string(attrs.get("address_lines"));

    Ok(BillingGroupRequest {
        billing_group_name: require_str(attrs, "name")?,
        account_id: get_str(attrs, "parent_id").or_else(|| get_str(attrs, "account_id")),
        card_id: get_str(attrs, "card_id"),
        vat_id: get_str(attrs, "vat_id"),
        billing_currency: get_str(attrs, "billing_currency"),
        billing_extra_text: get_str(attrs, "billing_extra_text"),
        billing_emails: Some(emails).filter(|e| !e.is_empty()),
        company: get_str(attrs, "company"),
        // Clearing the address on update needs an explicit empty list
        address_lines: Some(address_lines).filter(|a| !creating || !a.is_empty()),
        country_code: get_str(attrs, "country_code"),
        city: get_str(attrs, "city"),
        zip_code: get_str(attrs, "zip_code"),
        state: get_str(attrs, "state"),
        copy_from_billing_group: if creating {
            get_str(attrs, "copy_from_billing_group")
        } else {
            None
        },
    })
}

pub struct BillingGroupHandler;

#[async_trait]
impl ResourceHandler for BillingGroupHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let body = ctx.client.post("/billing-group", &request(attrs, true)?).await?;
        let group: BillingGroup = serde_json::from_value(take_field(body, "billing_group")?)?;
        Ok(group.billing_group_id)
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        billing_group_attributes(&get_billing_group(ctx.client, id).await?)
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let body = ctx
            .client
            .put(&format!("/billing-group/{}", escape(id)), &request(attrs, false)?)
            .await?;
        let group: BillingGroup = serde_json::from_value(take_field(body, "billing_group")?)?;
        Ok(group.billing_group_id)
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        omit_not_found(
            ctx.client
                .delete(&format!("/billing-group/{}", escape(id)))
                .await,
        )
    }
}
