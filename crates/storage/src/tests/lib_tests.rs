use super::*;
use chrono::{NaiveDate, Utc};
use listing::{
    DeleteOutcome, EditableEntity, EditableRepository, FileStore, ListQuery, PageRequest,
    Repository, SortDirection,
};
use shared::domain::{ProductId, PurchaseStatus, QuotationStatus, SaleId};

fn query(search: Option<&str>, sort_field: &str, sort_direction: SortDirection) -> ListQuery {
    ListQuery {
        search: search.map(str::to_string),
        sort_field: sort_field.to_string(),
        sort_direction,
        scope: None,
    }
}

fn product(category_id: CategoryId, name: &str, code: &str, price: f64) -> NewProduct {
    NewProduct {
        category_id,
        brand_id: None,
        name: name.to_string(),
        code: code.to_string(),
        barcode_symbology: "C128".to_string(),
        unit: "pc".to_string(),
        quantity: 5,
        cost: price / 2.0,
        price,
        stock_alert: 1,
        order_tax: None,
        tax_type: None,
        note: None,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
}

async fn seeded() -> (Storage, Vec<ProductId>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let drinks = storage.create_category(Some("DR"), "Drinks").await.expect("category");
    let snacks = storage.create_category(Some("SN"), "Snacks").await.expect("category");
    let mut ids = Vec::new();
    for new in [
        product(drinks, "Cola", "P-001", 2.5),
        product(drinks, "Lemonade", "P-002", 3.0),
        product(snacks, "Crisps", "P-003", 2.5),
        product(snacks, "100% Cocoa bar", "P-004", 4.0),
    ] {
        ids.push(storage.insert_product(&new).await.expect("product"));
    }
    (storage, ids)
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("backoffice.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn search_matches_category_name_case_insensitively() {
    let (storage, _) = seeded().await;
    let page = Repository::<Product>::query_page(
        &storage,
        &query(Some("drinks"), "id", SortDirection::Asc),
        PageRequest { page: 1, page_size: 10 },
    )
    .await
    .expect("page");
    assert_eq!(page.total, 2);
    assert_eq!(
        page.items.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["Cola", "Lemonade"]
    );
}

#[tokio::test]
async fn search_treats_pattern_characters_literally() {
    let (storage, _) = seeded().await;
    let search = query(Some("%"), "id", SortDirection::Asc);
    let rows = Repository::<Product>::query_all(&storage, &search)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code, "P-004");

    for raw in [".", "(", "P-00."] {
        let search = query(Some(raw), "id", SortDirection::Asc);
        let rows = Repository::<Product>::query_all(&storage, &search)
            .await
            .expect("rows");
        assert!(rows.is_empty(), "{raw:?} matched {rows:?}");
    }
}

#[tokio::test]
async fn search_folds_non_ascii_case() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let drinks = storage.create_category(None, "Drinks").await.expect("category");
    storage
        .insert_product(&product(drinks, "CAFÉ NOIR", "P-010", 2.0))
        .await
        .expect("product");
    storage
        .insert_product(&product(drinks, "Cafe latte", "P-011", 3.0))
        .await
        .expect("product");

    for needle in ["CAFÉ", "café", "CAFÉ NOIR", "café noir"] {
        let search = query(Some(needle), "id", SortDirection::Asc);
        let rows = Repository::<Product>::query_all(&storage, &search)
            .await
            .expect("rows");
        assert_eq!(
            rows.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["CAFÉ NOIR"],
            "search {needle:?}"
        );
    }
}

#[test]
fn searchable_fields_resolve_to_columns() {
    for (name, table) in [
        ("products", &products::PRODUCT_TABLE),
        ("quotations", &quotations::QUOTATION_TABLE),
        ("sale_payments", &sale_payments::SALE_PAYMENT_TABLE),
    ] {
        assert_eq!(
            table.search_columns().count(),
            table.searchable.len(),
            "{name} has a searchable field without a column"
        );
    }
    assert_eq!(
        products::PRODUCT_TABLE.searchable,
        <Product as listing::ListEntity>::SEARCHABLE
    );
}

#[tokio::test]
async fn equal_sort_keys_fall_back_to_id_in_the_same_direction() {
    let (storage, ids) = seeded().await;
    let by_price = query(None, "price", SortDirection::Asc);
    let asc = Repository::<Product>::query_all(&storage, &by_price)
        .await
        .expect("asc");
    assert_eq!(
        asc.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![ids[0], ids[2], ids[1], ids[3]]
    );

    let by_price = query(None, "price", SortDirection::Desc);
    let desc = Repository::<Product>::query_all(&storage, &by_price)
        .await
        .expect("desc");
    assert_eq!(
        desc.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![ids[3], ids[1], ids[2], ids[0]]
    );
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_correct_total() {
    let (storage, _) = seeded().await;
    let page = Repository::<Product>::query_page(
        &storage,
        &query(None, "id", SortDirection::Desc),
        PageRequest { page: 7, page_size: 3 },
    )
    .await
    .expect("page");
    assert!(page.items.is_empty());
    assert_eq!(page.total, 4);
}

#[tokio::test]
async fn delete_with_missing_id_deletes_nothing() {
    let (storage, ids) = seeded().await;
    let missing = ProductId(9_999);

    let outcome = Repository::<Product>::delete_by_ids(&storage, &[ids[0], missing, ids[1]])
        .await
        .expect("delete");
    assert_eq!(outcome, DeleteOutcome::Missing(vec![missing]));
    assert!(storage.find_product(ids[0]).await.expect("find").is_some());
    assert!(storage.find_product(ids[1]).await.expect("find").is_some());

    let outcome = Repository::<Product>::delete_by_ids(&storage, &[ids[0], ids[1]])
        .await
        .expect("delete");
    assert_eq!(outcome, DeleteOutcome::Deleted(2));
    assert!(storage.find_product(ids[0]).await.expect("find").is_none());
}

#[tokio::test]
async fn saved_product_reloads_equal_except_updated_at() {
    let (storage, ids) = seeded().await;
    let before = storage.find_product(ids[0]).await.expect("find").expect("product");

    let mut edited = before.clone();
    edited
        .apply_fields(&before.form_fields())
        .expect("unchanged fields are valid");
    edited.touch(Utc::now() + chrono::Duration::seconds(5));
    storage.save(&edited).await.expect("save");

    let after = storage.find_product(ids[0]).await.expect("find").expect("product");
    assert_ne!(after.updated_at, before.updated_at);
    assert_eq!(
        Product {
            updated_at: before.updated_at,
            ..after
        },
        before
    );
}

#[tokio::test]
async fn product_rules_reject_negative_cost() {
    let (storage, ids) = seeded().await;
    let existing = storage.find_product(ids[0]).await.expect("find").expect("product");
    let mut fields = existing.form_fields();
    fields.insert("cost".into(), serde_json::json!(-1));

    let errors = NewProduct::from_fields(&fields).expect_err("invalid");
    assert_eq!(errors.field_names(), vec!["cost"]);
    assert_eq!(errors.messages("cost"), ["The cost must be at least 0."]);
}

#[tokio::test]
async fn sale_payments_are_scoped_to_their_sale() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.create_sale("SL-1", day(1), None, 10_000).await.expect("sale");
    let second = storage.create_sale("SL-2", day(2), None, 5_000).await.expect("sale");
    for (sale, reference, amount) in [
        (first, "PAY-1", 2_500),
        (first, "PAY-2", 2_500),
        (second, "PAY-3", 5_000),
    ] {
        storage
            .insert_sale_payment(&NewSalePayment {
                sale_id: sale,
                reference: reference.to_string(),
                amount,
                date: day(3),
                payment_method: "Cash".to_string(),
                note: None,
            })
            .await
            .expect("payment");
    }

    let mut scoped = query(None, "id", SortDirection::Asc);
    scoped.scope = Some(first.0);
    let rows = Repository::<SalePayment>::query_all(&storage, &scoped)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|p| p.sale_id == first));

    let sale = storage.find_sale(first).await.expect("find").expect("sale");
    assert_eq!(sale.paid_amount, 5_000);
    assert_eq!(sale.due_amount, 5_000);
    assert!(storage.find_sale(SaleId(404)).await.expect("find").is_none());
}

#[tokio::test]
async fn quotations_search_customer_names() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let alice = storage.create_customer("Alice Smith", None, None).await.expect("customer");
    let bob = storage.create_customer("Bob Jones", None, None).await.expect("customer");
    for (reference, customer) in [("QT-1", alice), ("QT-2", bob), ("QT-3", alice)] {
        storage
            .insert_quotation(&NewQuotation {
                reference: reference.to_string(),
                date: day(4),
                customer_id: customer,
                total_amount: 1_000,
                status: QuotationStatus::Pending,
                note: None,
            })
            .await
            .expect("quotation");
    }

    let rows = Repository::<Quotation>::query_all(
        &storage,
        &query(Some("SMITH"), "reference", SortDirection::Desc),
    )
    .await
    .expect("rows");
    assert_eq!(
        rows.iter().map(|q| q.reference.as_str()).collect::<Vec<_>>(),
        vec!["QT-3", "QT-1"]
    );
    assert_eq!(rows[0].customer_name.as_deref(), Some("Alice Smith"));
}

#[tokio::test]
async fn supplier_totals_count_only_completed_documents_for_debit() {
    let (storage, ids) = seeded().await;
    let supplier = storage.create_supplier("Acme", None).await.expect("supplier");
    storage
        .insert_purchase(&NewPurchase {
            supplier_id: supplier,
            reference: "PR-1".to_string(),
            date: day(5),
            status: PurchaseStatus::Completed,
            total_amount: 20_000,
            paid_amount: 15_000,
            lines: vec![(ids[0], 2, 125), (ids[1], 1, 150)],
        })
        .await
        .expect("purchase");
    storage
        .insert_purchase(&NewPurchase {
            supplier_id: supplier,
            reference: "PR-2".to_string(),
            date: day(6),
            status: PurchaseStatus::Pending,
            total_amount: 7_000,
            paid_amount: 0,
            lines: vec![(ids[2], 1, 125)],
        })
        .await
        .expect("purchase");
    storage
        .insert_purchase_return(supplier, "RT-1", day(7), PurchaseStatus::Completed, 3_000)
        .await
        .expect("return");

    let totals = storage
        .supplier_totals(supplier)
        .await
        .expect("totals")
        .expect("supplier");
    assert_eq!(totals.supplier_name, "Acme");
    assert_eq!(totals.purchases_total, 27_000);
    assert_eq!(totals.purchases_paid, 15_000);
    assert_eq!(totals.purchases_due, 12_000);
    assert_eq!(totals.completed_purchases, 20_000);
    assert_eq!(totals.returns_total, 3_000);
    assert_eq!(totals.completed_returns, 3_000);
    assert!((totals.completed_product_costs - 2.75).abs() < 1e-9);

    assert!(storage
        .supplier_totals(shared::domain::SupplierId(404))
        .await
        .expect("totals")
        .is_none());
}

#[tokio::test]
async fn lookups_list_reference_tables() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let brand = storage.create_brand("Acme").await.expect("brand");
    storage.create_warehouse("Main", Some("Oslo")).await.expect("warehouse");

    let brands = storage.lookup(LookupCategory::Brands).await.expect("brands");
    assert_eq!(brands.get(&brand.0).map(String::as_str), Some("Acme"));
    let warehouses = storage
        .lookup(LookupCategory::Warehouses)
        .await
        .expect("warehouses");
    assert_eq!(warehouses.len(), 1);
    assert!(storage
        .lookup(LookupCategory::Customers)
        .await
        .expect("customers")
        .is_empty());
}

#[tokio::test]
async fn local_file_store_writes_under_root_and_rejects_escapes() {
    let root = tempfile::tempdir().expect("tempdir");
    let store = LocalFileStore::new(root.path());

    let location = store
        .store_as("products", "cola.png", b"png-bytes")
        .await
        .expect("store");
    assert_eq!(location, "products/cola.png");
    assert_eq!(
        std::fs::read(root.path().join("products").join("cola.png")).expect("read"),
        b"png-bytes"
    );

    assert!(store.store_as("..", "x.png", b"x").await.is_err());
    assert!(store.store_as("products", "../x.png", b"x").await.is_err());
    assert!(store.store_as("products", "", b"x").await.is_err());
}
