//! Implements a SQLite backed order store.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use rusqlite::{Connection, Row, Transaction};

use crate::{
    Error,
    models::{Charge, ChargeDate, Order},
    stores::OrderStore,
};

/// The columns and join used by every order query.
///
/// One row per order and item pair; an order with no items yields a single
/// row with a NULL item.
const SELECT_ORDERS: &str = "SELECT p.id, p.href, p.price, p.card, p.amount, p.date, i.item
     FROM purchases p
     LEFT JOIN purchase_items pi ON p.id = pi.purchase_id
     LEFT JOIN items i ON pi.item_id = i.id";

/// How far a price or charge amount may be from a numeric query and still
/// match. Absolute, to absorb floating point round-trip noise.
const VALUE_TOLERANCE: f64 = 0.001;

/// Stores orders in a SQLite database.
///
/// All clones share a single connection behind a mutex, so at most one
/// write transaction is ever in flight. The underlying engine serializes
/// writers anyway; holding a single connection avoids "database is locked"
/// errors under concurrent access instead of surfacing them.
#[derive(Debug, Clone)]
pub struct SqliteOrderStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteOrderStore {
    /// Create a store for `connection`, adding the order tables if they do
    /// not exist yet.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if the schema could not be created.
    pub fn new(connection: Connection) -> Result<Self, Error> {
        initialize(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Open (or create) the database at `path` and create a store for it.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if the file could not be opened or the
    /// schema could not be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let connection = Connection::open(path)?;

        Self::new(connection)
    }

    /// Retrieve orders whose price or charge amount is within
    /// [VALUE_TOLERANCE] of `value`.
    fn search_by_value(&self, value: f64) -> Result<Vec<Order>, Error> {
        tracing::debug!("search_by_value({value})");

        let rows = self
            .connection
            .lock()
            .unwrap()
            .prepare(&format!(
                "{SELECT_ORDERS}
                 WHERE p.price BETWEEN ?1 - {VALUE_TOLERANCE} AND ?1 + {VALUE_TOLERANCE}
                    OR p.amount BETWEEN ?1 - {VALUE_TOLERANCE} AND ?1 + {VALUE_TOLERANCE}"
            ))?
            .query_map([value], map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fold_rows(rows))
    }

    /// Retrieve orders whose card label, any linked item text, or date
    /// string contains `text`.
    ///
    /// Matching is case sensitive: `instr` compares bytes, unlike `LIKE`
    /// which folds ASCII case.
    fn search_by_text(&self, text: &str) -> Result<Vec<Order>, Error> {
        tracing::debug!("search_by_text({text:?})");

        let rows = self
            .connection
            .lock()
            .unwrap()
            .prepare(&format!(
                "{SELECT_ORDERS}
                 WHERE instr(p.card, ?1) > 0
                    OR instr(i.item, ?1) > 0
                    OR instr(p.date, ?1) > 0"
            ))?
            .query_map([text], map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fold_rows(rows))
    }
}

impl OrderStore for SqliteOrderStore {
    /// Save `order`, replacing any previously saved order with the same ID.
    ///
    /// Repeated line item texts are dropped before saving, and item texts
    /// are interned: each distinct text is stored once and shared across
    /// orders. Replacing an order removes all of its previous item links,
    /// so a re-submission never appends to the old item list.
    ///
    /// Everything happens in one transaction; if any step fails the
    /// database is left exactly as it was.
    ///
    /// # Errors
    /// This function will return an:
    /// - [Error::ItemNotInserted] if a line item could not be interned,
    /// - [Error::StaleLinksNotDeleted] or [Error::StalePurchaseNotDeleted]
    ///   if the order being replaced could not be removed,
    /// - [Error::PurchaseNotInserted] or [Error::PurchaseItemNotInserted]
    ///   if the new rows could not be written,
    /// - or [Error::SqlError] if there is some other SQL error.
    fn save(&self, order: &Order) -> Result<bool, Error> {
        let connection = self.connection.lock().unwrap();
        let tx = connection.unchecked_transaction()?;

        // An order must not reference the same item twice.
        let mut item_texts = order.items.clone();
        item_texts.sort();
        item_texts.dedup();

        let mut item_ids = Vec::with_capacity(item_texts.len());
        for text in &item_texts {
            item_ids.push(intern_item(text, &tx)?);
        }

        let exists = has_order(&order.id, &tx)?;
        if exists {
            tx.execute(
                "DELETE FROM purchase_items WHERE purchase_id = ?1",
                [&order.id],
            )
            .map_err(Error::StaleLinksNotDeleted)?;
            tx.execute("DELETE FROM purchases WHERE id = ?1", [&order.id])
                .map_err(Error::StalePurchaseNotDeleted)?;
        }

        tx.execute(
            "INSERT INTO purchases (id, href, price, card, amount, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &order.id,
                &order.href,
                order.price,
                &order.charge.card,
                order.charge.amount,
                order.charge.date.as_str(),
            ),
        )
        .map_err(Error::PurchaseNotInserted)?;

        for item_id in item_ids {
            tx.execute(
                "INSERT INTO purchase_items (purchase_id, item_id) VALUES (?1, ?2)",
                (&order.id, item_id),
            )
            .map_err(Error::PurchaseItemNotInserted)?;
        }

        tx.commit()?;

        Ok(!exists)
    }

    /// Retrieve the order with `id` from the store.
    ///
    /// # Errors
    /// This function will return an:
    /// - [Error::NotFound] if `id` does not refer to a saved order,
    /// - or [Error::SqlError] if there is some other SQL error.
    fn load(&self, id: &str) -> Result<Order, Error> {
        let rows = self
            .connection
            .lock()
            .unwrap()
            .prepare(&format!("{SELECT_ORDERS} WHERE p.id = ?1"))?
            .query_map([id], map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut orders = fold_rows(rows);

        if orders.is_empty() {
            return Err(Error::NotFound);
        }

        Ok(orders.remove(0))
    }

    /// Retrieve the orders matching the free-text `query`.
    ///
    /// A query that parses as a number matches on price or charge amount
    /// within a small tolerance; anything else matches as a case sensitive
    /// substring of the card label, item texts, or date string. Numeric
    /// interpretation wins when both would apply, so an item literally
    /// named "2024" cannot be found by that text alone.
    ///
    /// # Errors
    /// This function will return an [Error::SqlError] if there is a SQL
    /// error.
    fn search(&self, query: &str) -> Result<Vec<Order>, Error> {
        tracing::debug!("search({query:?})");

        match query.parse::<f64>() {
            Ok(value) => self.search_by_value(value),
            Err(_) => self.search_by_text(query),
        }
    }
}

/// Add the order tables to the database if they do not exist, and switch
/// the database to write-ahead logging.
///
/// Safe to call on every start. Any DDL error is fatal: the store is not
/// constructed over a partial schema.
fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item TEXT UNIQUE
        );

        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            href TEXT,
            price REAL,
            card TEXT,
            amount REAL,
            date TEXT
        );

        CREATE TABLE IF NOT EXISTS purchase_items (
            purchase_id TEXT,
            item_id INTEGER,
            FOREIGN KEY(purchase_id) REFERENCES purchases(id),
            FOREIGN KEY(item_id) REFERENCES items(id),
            PRIMARY KEY (purchase_id, item_id)
        );",
    )?;

    connection.pragma_update(None, "journal_mode", "WAL")?;

    Ok(())
}

/// Look up the ID for an item with `text`, inserting it first if this is
/// the first time the text has been seen.
///
/// Runs inside the caller's transaction so a failed save rolls back newly
/// interned items along with everything else.
fn intern_item(text: &str, tx: &Transaction) -> Result<i64, Error> {
    let existing = tx
        .prepare("SELECT id FROM items WHERE item = ?1")?
        .query_row([text], |row| row.get(0));

    match existing {
        Ok(id) => Ok(id),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            tx.execute("INSERT INTO items (item) VALUES (?1)", [text])
                .map_err(Error::ItemNotInserted)?;

            Ok(tx.last_insert_rowid())
        }
        Err(error) => Err(error.into()),
    }
}

/// Whether an order with `id` has been saved before.
fn has_order(id: &str, tx: &Transaction) -> Result<bool, Error> {
    let existing = tx
        .prepare("SELECT id FROM purchases WHERE id = ?1")?
        .query_row([id], |row| row.get::<_, String>(0));

    match existing {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
        Err(error) => Err(error.into()),
    }
}

/// One row of the order and item join.
struct PurchaseRow {
    id: String,
    href: String,
    price: f64,
    card: String,
    amount: f64,
    date: ChargeDate,
    item: Option<String>,
}

fn map_row(row: &Row) -> Result<PurchaseRow, rusqlite::Error> {
    Ok(PurchaseRow {
        id: row.get(0)?,
        href: row.get(1)?,
        price: row.get(2)?,
        card: row.get(3)?,
        amount: row.get(4)?,
        date: ChargeDate::new(row.get::<_, String>(5)?),
        item: row.get(6)?,
    })
}

/// Fold flat join rows into one order per ID, most recent charge first.
///
/// The first row seen for an ID supplies the order's metadata and later
/// rows only contribute their item. The sort is stable, so orders whose
/// dates tie (or fail to parse) keep their grouping order.
fn fold_rows(rows: Vec<PurchaseRow>) -> Vec<Order> {
    let mut row_index: HashMap<String, usize> = HashMap::new();
    let mut orders: Vec<Order> = Vec::new();

    for row in rows {
        match row_index.get(&row.id) {
            Some(&at) => {
                if let Some(item) = row.item {
                    orders[at].items.push(item);
                }
            }
            None => {
                row_index.insert(row.id.clone(), orders.len());
                orders.push(Order {
                    id: row.id,
                    href: row.href,
                    items: row.item.into_iter().collect(),
                    price: row.price,
                    charge: Charge {
                        card: row.card,
                        amount: row.amount,
                        date: row.date,
                    },
                });
            }
        }
    }

    orders.sort_by(|a, b| b.charge.date.sort_key().cmp(&a.charge.date.sort_key()));

    orders
}

#[cfg(test)]
mod sqlite_order_store_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        models::{Charge, ChargeDate, Order},
        stores::OrderStore,
    };

    use super::SqliteOrderStore;

    fn get_test_store() -> SqliteOrderStore {
        let connection = Connection::open_in_memory().unwrap();
        SqliteOrderStore::new(connection).expect("Could not create order store")
    }

    fn test_order(id: &str) -> Order {
        Order {
            id: id.to_owned(),
            href: format!("https://example.com/order/{id}"),
            items: vec!["Stapler".to_owned(), "USB-C Cable".to_owned()],
            price: 21.99,
            charge: Charge {
                card: "Visa ending in 1234".to_owned(),
                amount: 21.99,
                date: ChargeDate::new("January 15, 2024"),
            },
        }
    }

    fn count_rows(store: &SqliteOrderStore, table: &str) -> i64 {
        store
            .connection
            .lock()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn save_reports_created_then_replaced() {
        let store = get_test_store();
        let order = test_order("111-1");

        let first = store.save(&order).expect("Could not save order");
        let second = store.save(&order).expect("Could not save order again");

        assert!(first, "first save should report a fresh insert");
        assert!(!second, "second save should report a replace");
    }

    #[test]
    fn save_then_load_round_trips_content() {
        let store = get_test_store();
        let order = test_order("111-2");

        store.save(&order).unwrap();
        let loaded = store.load(&order.id).unwrap();
        assert_eq!(loaded, order);

        // The content must survive a re-submission unchanged too.
        store.save(&order).unwrap();
        let loaded = store.load(&order.id).unwrap();
        assert_eq!(loaded, order);
    }

    #[test]
    fn save_drops_repeated_item_texts() {
        let store = get_test_store();
        let mut order = test_order("111-3");
        order.items = vec![
            "Stapler".to_owned(),
            "Stapler".to_owned(),
            "USB-C Cable".to_owned(),
        ];

        store.save(&order).unwrap();

        assert_eq!(count_rows(&store, "items"), 2);
        let loaded = store.load(&order.id).unwrap();
        assert_eq!(
            loaded.items,
            vec!["Stapler".to_owned(), "USB-C Cable".to_owned()]
        );
    }

    #[test]
    fn save_replaces_items_instead_of_appending() {
        let store = get_test_store();
        let mut order = test_order("111-4");
        order.items = vec!["Stapler".to_owned(), "USB-C Cable".to_owned()];
        store.save(&order).unwrap();

        order.items = vec!["Notebook".to_owned()];
        store.save(&order).unwrap();

        let loaded = store.load(&order.id).unwrap();
        assert_eq!(loaded.items, vec!["Notebook".to_owned()]);
        assert_eq!(count_rows(&store, "purchase_items"), 1);
    }

    #[test]
    fn save_interns_item_texts_across_orders() {
        let store = get_test_store();
        let mut first = test_order("111-5");
        first.items = vec!["USB-C Cable".to_owned()];
        let mut second = test_order("111-6");
        second.items = vec!["USB-C Cable".to_owned()];

        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(count_rows(&store, "items"), 1);
        assert_eq!(count_rows(&store, "purchase_items"), 2);
    }

    #[test]
    fn save_keeps_orphaned_items() {
        let store = get_test_store();
        let mut order = test_order("111-7");
        order.items = vec!["Stapler".to_owned()];
        store.save(&order).unwrap();

        order.items = vec!["Notebook".to_owned()];
        store.save(&order).unwrap();

        // "Stapler" is no longer referenced but is never garbage collected.
        assert_eq!(count_rows(&store, "items"), 2);
    }

    #[test]
    fn load_missing_order_returns_not_found() {
        let store = get_test_store();

        let result = store.load("nonexistent");

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn search_matches_price_within_tolerance() {
        let store = get_test_store();
        let mut exact = test_order("222-1");
        exact.price = 19.9995;
        let mut edge = test_order("222-2");
        edge.price = 19.999;
        let mut outside = test_order("222-3");
        outside.price = 19.9985;
        for order in [&exact, &edge, &outside] {
            store.save(order).unwrap();
        }

        let results = store.search("20.0").unwrap();

        let ids: Vec<&str> = results.iter().map(|order| order.id.as_str()).collect();
        assert!(ids.contains(&"222-1"), "19.9995 is within 0.001 of 20.0");
        // 20.0 - 0.001 rounds to the same double as the literal 19.999, and
        // BETWEEN is inclusive, so the edge case matches.
        assert!(ids.contains(&"222-2"), "19.999 sits exactly on the edge");
        assert!(!ids.contains(&"222-3"), "19.9985 is outside the tolerance");
    }

    #[test]
    fn search_matches_charge_amount_too() {
        let store = get_test_store();
        let mut order = test_order("222-4");
        order.price = 100.0;
        order.charge.amount = 42.5;
        store.save(&order).unwrap();

        let results = store.search("42.5").unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "222-4");
    }

    #[test]
    fn numeric_queries_never_match_item_text() {
        let store = get_test_store();
        let mut by_text = test_order("222-5");
        by_text.items = vec!["2024 Wall Calendar".to_owned()];
        by_text.price = 10.0;
        by_text.charge.amount = 10.0;
        let mut by_value = test_order("222-6");
        by_value.price = 2024.0;
        store.save(&by_text).unwrap();
        store.save(&by_value).unwrap();

        let results = store.search("2024").unwrap();

        // "2024" parses as a number, so the item named after the year is
        // unreachable by that query alone.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "222-6");
    }

    #[test]
    fn search_matches_item_substring() {
        let store = get_test_store();
        store.save(&test_order("333-1")).unwrap();

        let results = store.search("Cable").unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "333-1");
    }

    #[test]
    fn search_is_case_sensitive() {
        let store = get_test_store();
        store.save(&test_order("333-2")).unwrap();

        let results = store.search("usb-c").unwrap();

        assert!(results.is_empty(), "substring matching compares bytes");
    }

    #[test]
    fn search_matches_card_and_date_substrings() {
        let store = get_test_store();
        store.save(&test_order("333-3")).unwrap();

        let by_card = store.search("Visa").unwrap();
        let by_date = store.search("January").unwrap();

        assert_eq!(by_card.len(), 1);
        assert_eq!(by_date.len(), 1);
    }

    #[test]
    fn search_returns_empty_for_no_matches() {
        let store = get_test_store();
        store.save(&test_order("333-4")).unwrap();

        let results = store.search("zzzzzz").unwrap();

        assert!(results.is_empty());
    }

    #[test]
    fn search_returns_most_recent_charge_first() {
        let store = get_test_store();
        let mut january = test_order("444-1");
        january.charge.date = ChargeDate::new("January 1, 2024");
        let mut march = test_order("444-2");
        march.charge.date = ChargeDate::new("March 3, 2024");
        let mut unparseable = test_order("444-3");
        unparseable.charge.date = ChargeDate::new("sometime in spring");
        for order in [&january, &march, &unparseable] {
            store.save(order).unwrap();
        }

        let results = store.search("Visa").unwrap();

        let ids: Vec<&str> = results.iter().map(|order| order.id.as_str()).collect();
        assert_eq!(ids, vec!["444-2", "444-1", "444-3"]);
    }

    #[test]
    fn order_without_items_round_trips() {
        let store = get_test_store();
        let mut order = test_order("555-1");
        order.items = vec![];

        store.save(&order).unwrap();
        let loaded = store.load(&order.id).unwrap();

        assert_eq!(loaded, order);
        assert_eq!(count_rows(&store, "purchase_items"), 0);
    }

    #[test]
    fn search_matches_only_searched_item_text() {
        let store = get_test_store();
        let mut order = test_order("555-2");
        order.items = vec!["Desk Lamp".to_owned(), "Stapler".to_owned()];
        store.save(&order).unwrap();

        let results = store.search("Lamp").unwrap();

        // The join only returns rows for items that matched, so the order
        // comes back with the matching subset of its items.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].items, vec!["Desk Lamp".to_owned()]);
    }
}
