use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use shelfwise_core::domain::catalog::{
    BookFilter, CatalogItem, InventorySummary, Isbn, PriceChange, StockChange,
};
use shelfwise_core::domain::customer::{Customer, CustomerId};
use shelfwise_core::domain::order::{
    Order, OrderDetailLine, OrderDetails, OrderId, OrderLine, OrderRejection, OrderRequest,
    OrderStatus, PlacedLine, PlacedOrder,
};

use super::{
    CatalogRepository, CustomerRepository, OrderPlacementError, OrderRepository, RepositoryError,
};

#[derive(Default)]
struct LibraryState {
    items: BTreeMap<Isbn, CatalogItem>,
    customers: BTreeMap<CustomerId, Customer>,
    orders: BTreeMap<OrderId, Order>,
}

/// Whole-store lock: an order placement holds the write guard from the customer
/// check through the stock decrement.
#[derive(Default)]
pub struct InMemoryLibraryStore {
    state: RwLock<LibraryState>,
}

impl InMemoryLibraryStore {
    pub fn new(items: Vec<CatalogItem>, customers: Vec<Customer>) -> Self {
        let state = LibraryState {
            items: items.into_iter().map(|item| (item.isbn.clone(), item)).collect(),
            customers: customers.into_iter().map(|customer| (customer.id, customer)).collect(),
            orders: BTreeMap::new(),
        };
        Self { state: RwLock::new(state) }
    }

    pub async fn insert_item(&self, item: CatalogItem) {
        self.state.write().await.items.insert(item.isbn.clone(), item);
    }

    pub async fn insert_customer(&self, customer: Customer) {
        self.state.write().await.customers.insert(customer.id, customer);
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryLibraryStore {
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<CatalogItem>, RepositoryError> {
        Ok(self.state.read().await.items.get(isbn).cloned())
    }

    async fn search(&self, filter: &BookFilter) -> Result<Vec<CatalogItem>, RepositoryError> {
        let state = self.state.read().await;
        let mut matches =
            state.items.values().filter(|item| filter.matches(item)).cloned().collect::<Vec<_>>();
        matches.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(matches)
    }

    async fn list_titles(&self) -> Result<Vec<(Isbn, String)>, RepositoryError> {
        let state = self.state.read().await;
        let mut titles = state
            .items
            .values()
            .map(|item| (item.isbn.clone(), item.title.clone()))
            .collect::<Vec<_>>();
        titles.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(titles)
    }

    async fn restock(
        &self,
        isbn: &Isbn,
        quantity: i64,
    ) -> Result<Option<StockChange>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(item) = state.items.get_mut(isbn) else {
            return Ok(None);
        };
        let previous_stock = item.stock;
        item.stock = previous_stock.checked_add(quantity).ok_or_else(|| {
            RepositoryError::StockOverflow { isbn: isbn.clone(), stock: previous_stock, quantity }
        })?;

        Ok(Some(StockChange {
            isbn: item.isbn.clone(),
            title: item.title.clone(),
            added: quantity,
            previous_stock,
            new_stock: item.stock,
        }))
    }

    async fn update_price(
        &self,
        isbn: &Isbn,
        new_price: Decimal,
    ) -> Result<Option<PriceChange>, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.items.get_mut(isbn).map(|item| {
            let old_price = std::mem::replace(&mut item.price, new_price);
            PriceChange { isbn: item.isbn.clone(), title: item.title.clone(), old_price, new_price }
        }))
    }

    async fn inventory_summary(
        &self,
        low_stock_threshold: i64,
    ) -> Result<InventorySummary, RepositoryError> {
        let state = self.state.read().await;
        let items = state.items.values().cloned().collect::<Vec<_>>();
        Ok(InventorySummary::from_items(&items, low_stock_threshold))
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryLibraryStore {
    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.state.read().await.customers.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        Ok(self.state.read().await.customers.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryLibraryStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let state = self.state.read().await;
        let Some(order) = state.orders.get(&id) else {
            return Ok(None);
        };
        let customer = state.customers.get(&order.customer_id).cloned().ok_or_else(|| {
            RepositoryError::Decode(format!(
                "order {} references missing customer {}",
                order.id, order.customer_id
            ))
        })?;
        let lines = order
            .lines
            .iter()
            .map(|line| {
                let item = state.items.get(&line.isbn);
                OrderDetailLine {
                    isbn: line.isbn.clone(),
                    title: item.map(|item| item.title.clone()).unwrap_or_default(),
                    author: item.map(|item| item.author.clone()).unwrap_or_default(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                }
            })
            .collect();

        Ok(Some(OrderDetails { order: order.clone(), customer, lines }))
    }

    async fn max_order_id(&self) -> Result<Option<OrderId>, RepositoryError> {
        Ok(self.state.read().await.orders.keys().next_back().copied())
    }

    async fn place_order_once(
        &self,
        request: &OrderRequest,
    ) -> Result<PlacedOrder, OrderPlacementError> {
        let mut state = self.state.write().await;

        let customer = state
            .customers
            .get(&request.customer_id)
            .cloned()
            .ok_or(OrderRejection::CustomerNotFound(request.customer_id))?;

        request.check_shape()?;
        let requested = request.aggregated_lines()?;
        for line in &requested {
            let item = state
                .items
                .get(&line.isbn)
                .ok_or_else(|| OrderRejection::ItemNotFound(line.isbn.clone()))?;
            if line.quantity > item.stock {
                return Err(OrderRejection::InsufficientStock {
                    isbn: item.isbn.clone(),
                    title: item.title.clone(),
                    available: item.stock,
                    requested: line.quantity,
                }
                .into());
            }
        }

        let order_id = OrderId(state.orders.keys().next_back().map(|id| id.0).unwrap_or(0) + 1);
        let mut lines = Vec::with_capacity(requested.len());
        let mut placed_lines = Vec::with_capacity(requested.len());
        for line in requested {
            let Some(item) = state.items.get_mut(&line.isbn) else {
                return Err(OrderPlacementError::Inconsistent(format!(
                    "ISBN {} disappeared during the order transaction",
                    line.isbn
                )));
            };
            item.stock -= line.quantity;
            lines.push(OrderLine {
                order_id,
                isbn: line.isbn.clone(),
                quantity: line.quantity,
                unit_price: item.price,
            });
            placed_lines.push(PlacedLine {
                isbn: line.isbn,
                title: item.title.clone(),
                quantity: line.quantity,
                unit_price: item.price,
                remaining_stock: item.stock,
            });
        }

        let order = Order {
            id: order_id,
            customer_id: customer.id,
            status: OrderStatus::Completed,
            total_amount: lines.iter().map(OrderLine::line_total).sum(),
            created_at: Utc::now(),
            lines,
        };
        state.orders.insert(order_id, order.clone());

        Ok(PlacedOrder { order, customer_name: customer.name, lines: placed_lines })
    }
}
