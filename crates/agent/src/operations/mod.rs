//! The fixed operation catalog the planner may call.
//!
//! [`OperationKind`] is the registry key; [`Operation`] is a decoded call with
//! typed parameters. Handlers live in [`handlers`].

pub mod handlers;
pub mod params;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shelfwise_core::domain::catalog::{BookFilter, Isbn};
use shelfwise_core::domain::customer::CustomerId;
use shelfwise_core::domain::order::{OrderId, OrderLineRequest, OrderRequest};

pub use handlers::{HandlerOutput, OperationContext};
pub use params::{ParameterContract, ParameterSpec, ParameterType, ValidationError};

use params::{non_negative, quantity, Params, QUANTITY_CONSTRAINT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FindBooks,
    CreateOrder,
    RestockBook,
    UpdatePrice,
    OrderStatus,
    InventorySummary,
    SearchKnowledgeBase,
    ListCustomers,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        Self::FindBooks,
        Self::CreateOrder,
        Self::RestockBook,
        Self::UpdatePrice,
        Self::OrderStatus,
        Self::InventorySummary,
        Self::SearchKnowledgeBase,
        Self::ListCustomers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FindBooks => "find_books",
            Self::CreateOrder => "create_order",
            Self::RestockBook => "restock_book",
            Self::UpdatePrice => "update_price",
            Self::OrderStatus => "order_status",
            Self::InventorySummary => "inventory_summary",
            Self::SearchKnowledgeBase => "search_knowledge_base",
            Self::ListCustomers => "list_customers",
        }
    }

    /// Exact wire-name lookup, tolerant of surrounding whitespace and case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::FindBooks => "Search books by title, author, price, or stock status",
            Self::CreateOrder => "Create new orders for customers with book items",
            Self::RestockBook => "Add more copies to book inventory",
            Self::UpdatePrice => "Change book prices",
            Self::OrderStatus => "Check order details and status",
            Self::InventorySummary => "Get inventory overview",
            Self::SearchKnowledgeBase => "Search documentation",
            Self::ListCustomers => "Show all customers",
        }
    }

    pub fn contract(self) -> ParameterContract {
        use ParameterType::{Boolean, Integer, Number, OrderItems, String};

        ParameterContract::new(match self {
            Self::FindBooks => vec![
                ParameterSpec::optional("title", String),
                ParameterSpec::optional("author", String),
                ParameterSpec::optional("max_price", Number).with_constraint("must be >= 0"),
                ParameterSpec::optional("in_stock", Boolean).with_constraint("defaults to true"),
            ],
            Self::CreateOrder => vec![
                ParameterSpec::required("customer_id", Integer),
                ParameterSpec::required("items", OrderItems)
                    .with_constraint("non-empty, each quantity must be between 1 and 1000000"),
            ],
            Self::RestockBook => vec![
                ParameterSpec::required("isbn", String),
                ParameterSpec::required("quantity", Integer).with_constraint(QUANTITY_CONSTRAINT),
            ],
            Self::UpdatePrice => vec![
                ParameterSpec::required("isbn", String),
                ParameterSpec::required("new_price", Number).with_constraint("must be >= 0"),
            ],
            Self::OrderStatus => vec![ParameterSpec::required("order_id", Integer)],
            Self::InventorySummary | Self::ListCustomers => Vec::new(),
            Self::SearchKnowledgeBase => vec![
                ParameterSpec::required("query", String).with_constraint("must not be empty"),
            ],
        })
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A call whose parameters satisfied its kind's contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    FindBooks(BookFilter),
    CreateOrder(OrderRequest),
    RestockBook { isbn: Isbn, quantity: i64 },
    UpdatePrice { isbn: Isbn, new_price: Decimal },
    OrderStatus { order_id: OrderId },
    InventorySummary,
    SearchKnowledgeBase { query: String },
    ListCustomers,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::FindBooks(_) => OperationKind::FindBooks,
            Self::CreateOrder(_) => OperationKind::CreateOrder,
            Self::RestockBook { .. } => OperationKind::RestockBook,
            Self::UpdatePrice { .. } => OperationKind::UpdatePrice,
            Self::OrderStatus { .. } => OperationKind::OrderStatus,
            Self::InventorySummary => OperationKind::InventorySummary,
            Self::SearchKnowledgeBase { .. } => OperationKind::SearchKnowledgeBase,
            Self::ListCustomers => OperationKind::ListCustomers,
        }
    }

    pub fn decode(kind: OperationKind, parameters: &Value) -> Result<Self, ValidationError> {
        let params = Params::new(parameters)?;

        Ok(match kind {
            OperationKind::FindBooks => Self::FindBooks(BookFilter {
                title: params.optional_string("title")?,
                author: params.optional_string("author")?,
                max_price: params
                    .optional_decimal("max_price")?
                    .map(|price| non_negative("max_price", price))
                    .transpose()?,
                in_stock: params.optional_bool("in_stock")?.unwrap_or(true),
            }),
            OperationKind::CreateOrder => Self::CreateOrder(decode_order(&params)?),
            OperationKind::RestockBook => Self::RestockBook {
                isbn: Isbn(params.required_string("isbn")?),
                quantity: quantity("quantity", params.required_integer("quantity")?)?,
            },
            OperationKind::UpdatePrice => Self::UpdatePrice {
                isbn: Isbn(params.required_string("isbn")?),
                new_price: non_negative("new_price", params.required_decimal("new_price")?)?,
            },
            OperationKind::OrderStatus => {
                Self::OrderStatus { order_id: OrderId(params.required_integer("order_id")?) }
            }
            OperationKind::InventorySummary => Self::InventorySummary,
            OperationKind::SearchKnowledgeBase => {
                Self::SearchKnowledgeBase { query: params.required_string("query")? }
            }
            OperationKind::ListCustomers => Self::ListCustomers,
        })
    }
}

/// Item quantities are left to the order transaction, which reports
/// out-of-range values as a rejection naming the ISBN.
fn decode_order(params: &Params<'_>) -> Result<OrderRequest, ValidationError> {
    let customer_id = CustomerId(params.required_integer("customer_id")?);
    let items = params.required_list("items")?;
    if items.is_empty() {
        return Err(ValidationError::Constraint {
            name: "items".to_string(),
            constraint: "must not be empty",
            value: "[]".to_string(),
        });
    }

    let lines = items
        .iter()
        .map(|item| {
            let item = Params::new(item)?;
            Ok(OrderLineRequest {
                isbn: Isbn(item.required_string("isbn")?),
                quantity: item.required_integer("quantity")?,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    Ok(OrderRequest { customer_id, lines })
}
