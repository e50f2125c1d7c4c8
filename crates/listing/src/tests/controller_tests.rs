use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use super::*;
use crate::{
    auth::{Actor, StaticPolicy},
    collaborators::{Notification, NotificationLog},
    editing::SessionState,
    entity::Grants,
    gateway::{ExportTable, RowOutcome, RowStatus},
    lookup::LookupCategory,
    query::SortDirection,
    validation::{self, Rule, RuleSet, ValidationErrors},
};

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: u32,
    name: String,
    sku: String,
    price: f64,
    image: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ListEntity for Item {
    type Id = u32;
    const NAME: &'static str = "items";
    const LABEL: &'static str = "Item";
    const ORDERABLE: &'static [&'static str] = &["id", "name", "price"];
    const SEARCHABLE: &'static [&'static str] = &["name", "sku"];
    const GRANTS: Grants = Grants {
        access: "access_items",
        show: "show_items",
        edit: "edit_items",
        delete: "delete_items",
        import: "import_items",
        export: "export_items",
    };
    const DEFAULT_PAGE_SIZE: u32 = 2;
    const LOOKUPS: &'static [LookupCategory] = &[LookupCategory::Categories];

    fn id(&self) -> u32 {
        self.id
    }
}

impl EditableEntity for Item {
    const UPLOAD_FOLDER: &'static str = "items";

    fn rules() -> RuleSet {
        RuleSet::new()
            .field("name", &[Rule::Required, Rule::String, Rule::Max(255.0)])
            .field("sku", &[Rule::Required, Rule::String, Rule::Max(32.0)])
            .field("price", &[Rule::Required, Rule::Numeric, Rule::Min(0.0)])
    }

    fn form_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("sku".into(), json!(self.sku));
        fields.insert("price".into(), json!(self.price));
        fields
    }

    fn apply_fields(&mut self, fields: &Map<String, Value>) -> Result<(), ValidationErrors> {
        self.name = validation::text(fields, "name").unwrap_or_default();
        self.sku = validation::text(fields, "sku").unwrap_or_default();
        self.price = validation::number(fields, "price").unwrap_or_default();
        Ok(())
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn set_image(&mut self, file_name: String) {
        self.image = Some(file_name);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Exportable for Item {
    const EXPORT_HEADERS: &'static [&'static str] = &["id", "name"];

    fn export_row(&self) -> Vec<String> {
        vec![self.id.to_string(), self.name.clone()]
    }
}

#[derive(Clone, Default)]
struct MemoryRepo {
    rows: Arc<Mutex<Vec<Item>>>,
    fail_saves: bool,
}

impl MemoryRepo {
    fn with(items: Vec<Item>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(items)),
            fail_saves: false,
        }
    }

    fn snapshot(&self) -> Vec<Item> {
        self.rows.lock().expect("rows").clone()
    }

    fn filtered(&self, query: &ListQuery) -> Vec<Item> {
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<Item> = self
            .snapshot()
            .into_iter()
            .filter(|item| match &needle {
                Some(needle) => {
                    item.name.to_lowercase().contains(needle)
                        || item.sku.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| {
            let ordering = match query.sort_field.as_str() {
                "name" => a.name.cmp(&b.name),
                "price" => a.price.total_cmp(&b.price),
                _ => std::cmp::Ordering::Equal,
            }
            .then(a.id.cmp(&b.id));
            match query.sort_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        rows
    }
}

#[async_trait]
impl Repository<Item> for MemoryRepo {
    async fn find_by_id(&self, id: u32) -> anyhow::Result<Option<Item>> {
        Ok(self.snapshot().into_iter().find(|item| item.id == id))
    }

    async fn delete_by_ids(&self, ids: &[u32]) -> anyhow::Result<DeleteOutcome<u32>> {
        let mut rows = self.rows.lock().expect("rows");
        let missing: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|id| !rows.iter().any(|item| item.id == *id))
            .collect();
        if !missing.is_empty() {
            return Ok(DeleteOutcome::Missing(missing));
        }
        rows.retain(|item| !ids.contains(&item.id));
        Ok(DeleteOutcome::Deleted(ids.len() as u64))
    }

    async fn query_page(
        &self,
        query: &ListQuery,
        page: PageRequest,
    ) -> anyhow::Result<PagedResult<Item>> {
        let rows = self.filtered(query);
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(PagedResult {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn query_all(&self, query: &ListQuery) -> anyhow::Result<Vec<Item>> {
        Ok(self.filtered(query))
    }
}

#[async_trait]
impl EditableRepository<Item> for MemoryRepo {
    async fn save(&self, entity: &Item) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("disk full");
        }
        let mut rows = self.rows.lock().expect("rows");
        let slot = rows
            .iter_mut()
            .find(|item| item.id == entity.id)
            .ok_or_else(|| anyhow::anyhow!("missing row"))?;
        *slot = entity.clone();
        Ok(())
    }
}

#[derive(Default)]
struct MemoryFiles {
    stored: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl FileStore for MemoryFiles {
    async fn store_as(&self, folder: &str, name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        self.stored
            .lock()
            .expect("files")
            .push((folder.to_string(), name.to_string(), bytes.len()));
        Ok(format!("{folder}/{name}"))
    }
}

struct FixedLookups;

#[async_trait]
impl LookupSource for FixedLookups {
    async fn lookup(&self, category: LookupCategory) -> anyhow::Result<BTreeMap<i64, String>> {
        assert_eq!(category, LookupCategory::Categories);
        Ok(BTreeMap::from([(1, "Chairs".to_string()), (2, "Desks".to_string())]))
    }
}

#[derive(Default)]
struct CountingLookups {
    calls: AtomicUsize,
}

#[async_trait]
impl LookupSource for CountingLookups {
    async fn lookup(&self, _category: LookupCategory) -> anyhow::Result<BTreeMap<i64, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BTreeMap::new())
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("date")
}

fn item(id: u32, name: &str, sku: &str, price: f64) -> Item {
    Item {
        id,
        name: name.to_string(),
        sku: sku.to_string(),
        price,
        image: None,
        updated_at: epoch(),
    }
}

fn catalog() -> Vec<Item> {
    vec![
        item(1, "Oak Chair", "CH-1", 40.0),
        item(2, "Pine Desk", "DS-1", 120.0),
        item(3, "Steel Chair", "CH-2", 55.0),
        item(4, "Lamp", "LP-1", 15.0),
        item(5, "Armchair", "CH-3", 55.0),
    ]
}

fn admin() -> Authorizer {
    Authorizer::new(
        Arc::new(StaticPolicy::new().grant("admin", ["*"])),
        Actor::new("admin", ["admin"]),
    )
}

fn viewer() -> Authorizer {
    Authorizer::new(
        Arc::new(StaticPolicy::new().grant("viewer", ["access_items", "show_items"])),
        Actor::new("viewer", ["viewer"]),
    )
}

fn controller(repo: MemoryRepo) -> (ListQueryController<Item, MemoryRepo>, Arc<NotificationLog>) {
    let log = Arc::new(NotificationLog::new());
    let controller = ListQueryController::new(repo, admin())
        .with_notifier(log.clone())
        .with_file_store(Arc::new(MemoryFiles::default()));
    (controller, log)
}

#[tokio::test]
async fn starts_sorted_by_id_descending_with_entity_page_size() {
    let (controller, _) = controller(MemoryRepo::with(catalog()));
    assert_eq!(controller.state().sort_field(), "id");
    assert_eq!(controller.state().sort_direction(), SortDirection::Desc);

    let page = controller.fetch_page().await.expect("page");
    assert_eq!(page.total, 5);
    assert_eq!(page.items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![5, 4]);
}

#[tokio::test]
async fn search_matches_any_searchable_field_case_insensitively() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.on_page_size_changed(10).expect("page size");
    controller.on_search_changed("CH");

    let page = controller.fetch_page().await.expect("page");
    assert_eq!(page.total, 3);
    for row in &page.items {
        assert!(
            row.name.to_lowercase().contains("ch") || row.sku.to_lowercase().contains("ch"),
            "{row:?} does not match"
        );
    }
}

#[tokio::test]
async fn blank_search_applies_no_filter() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.on_search_changed("   ");
    assert_eq!(controller.list_query().search, None);
    assert_eq!(controller.fetch_page().await.expect("page").total, 5);
}

#[tokio::test]
async fn search_and_page_size_changes_reset_to_first_page() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.go_to_page(3);
    controller.on_search_changed("chair");
    assert_eq!(controller.state().current_page(), 1);

    controller.go_to_page(2);
    controller.on_page_size_changed(25).expect("page size");
    assert_eq!(controller.state().current_page(), 1);
    assert_eq!(controller.state().page_size(), 25);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.go_to_page(2);
    let err = controller.on_page_size_changed(0).expect_err("zero");
    assert!(matches!(err, ListingError::InvalidPageSize));
    assert_eq!(controller.state().page_size(), 2);
    assert_eq!(controller.state().current_page(), 2);
}

#[tokio::test]
async fn sort_requests_flip_same_field_and_start_new_fields_descending() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.on_sort_requested("id").expect("sort");
    assert_eq!(controller.state().sort_direction(), SortDirection::Asc);

    controller.on_sort_requested("price").expect("sort");
    assert_eq!(controller.state().sort_field(), "price");
    assert_eq!(controller.state().sort_direction(), SortDirection::Desc);

    let err = controller.on_sort_requested("sku").expect_err("not orderable");
    assert!(matches!(err, ListingError::InvalidSortField { .. }));
    assert_eq!(controller.state().sort_field(), "price");
    assert_eq!(controller.state().sort_direction(), SortDirection::Desc);
}

#[tokio::test]
async fn sorted_pages_are_totally_ordered_with_id_tie_break() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.on_page_size_changed(10).expect("page size");
    controller.on_sort_requested("price").expect("sort");
    controller.on_sort_requested("price").expect("flip");

    let page = controller.fetch_page().await.expect("page");
    let keys: Vec<(f64, u32)> = page.items.iter().map(|i| (i.price, i.id)).collect();
    assert_eq!(keys, vec![(15.0, 4), (40.0, 1), (55.0, 3), (55.0, 5), (120.0, 2)]);
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_correct_total() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.go_to_page(40);
    let page = controller.fetch_page().await.expect("page");
    assert!(page.items.is_empty());
    assert_eq!(page.total, 5);
    assert_eq!(page.last_page(), 3);
}

#[tokio::test]
async fn listing_without_access_grant_is_forbidden() {
    let authz = Authorizer::new(Arc::new(StaticPolicy::new()), Actor::anonymous());
    let controller: ListQueryController<Item, _> =
        ListQueryController::new(MemoryRepo::with(catalog()), authz);
    let err = controller.fetch_page().await.expect_err("forbidden");
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn mount_loads_declared_lookups() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.mount(&FixedLookups).await.expect("mount");
    assert_eq!(
        controller.lookups().display_name(LookupCategory::Categories, 2),
        Some("Desks")
    );
}

#[tokio::test]
async fn mount_without_access_grant_reads_no_lookups() {
    let authz = Authorizer::new(Arc::new(StaticPolicy::new()), Actor::anonymous());
    let mut controller: ListQueryController<Item, _> =
        ListQueryController::new(MemoryRepo::with(catalog()), authz);
    let source = CountingLookups::default();

    let err = controller.mount(&source).await.expect_err("forbidden");
    assert!(err.is_forbidden());
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bulk_delete_removes_every_selected_row_and_clears_selection() {
    let repo = MemoryRepo::with(catalog());
    let (mut controller, log) = controller(repo.clone());
    controller.selection_mut().select_all([1, 3]);

    let report = controller.delete_selected().await.expect("delete");
    assert_eq!(report, BulkDeleteReport { requested: 2, deleted: 2 });
    assert_eq!(controller.selected_count(), 0);
    assert_eq!(
        repo.snapshot().iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![2, 4, 5]
    );
    assert_eq!(
        log.drain(),
        vec![Notification {
            level: NotificationLevel::Success,
            message: "2 items deleted successfully.".into(),
        }]
    );
}

#[tokio::test]
async fn bulk_delete_with_missing_id_deletes_nothing_and_reports_it() {
    let repo = MemoryRepo::with(catalog());
    let (mut controller, _) = controller(repo.clone());
    controller.selection_mut().select_all([1, 42, 3]);

    let err = controller.delete_selected().await.expect_err("rejected");
    match err {
        ListingError::BulkDeleteRejected { missing, .. } => assert_eq!(missing, vec!["42"]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(repo.snapshot().len(), 5);
    assert_eq!(controller.selection().ids(), vec![1, 3]);
}

#[tokio::test]
async fn bulk_delete_without_grant_keeps_rows_and_selection() {
    let repo = MemoryRepo::with(catalog());
    let mut controller = ListQueryController::<Item, _>::new(repo.clone(), viewer());
    controller.selection_mut().toggle(1);

    let err = controller.delete_selected().await.expect_err("forbidden");
    assert!(err.is_forbidden());
    assert_eq!(repo.snapshot().len(), 5);
    assert_eq!(controller.selected_count(), 1);
}

#[tokio::test]
async fn deleting_an_unknown_row_is_not_found() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    let err = controller.delete(99).await.expect_err("missing");
    assert!(matches!(err, ListingError::NotFound { .. }));
    controller.delete(2).await.expect("delete");
}

#[tokio::test]
async fn view_and_edit_modals_follow_the_session_state() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.open_view(2).await.expect("view");
    assert!(controller.editing().modal_flags().show_modal);

    controller.open_edit(3).await.expect("edit");
    assert!(controller.editing().modal_flags().edit_modal);
    assert_eq!(controller.editing().entity().map(|i| i.id), Some(3));

    controller.close_modal();
    assert_eq!(controller.editing().state(), &SessionState::Closed);

    let err = controller.open_view(77).await.expect_err("missing");
    assert!(matches!(err, ListingError::NotFound { .. }));
}

#[tokio::test]
async fn edit_without_grant_leaves_session_closed() {
    let mut controller = ListQueryController::<Item, _>::new(MemoryRepo::with(catalog()), viewer());
    let err = controller.open_edit(1).await.expect_err("forbidden");
    assert!(err.is_forbidden());
    assert_eq!(controller.editing().state(), &SessionState::Closed);
}

#[tokio::test]
async fn submit_edit_requires_an_open_edit() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    let err = controller
        .submit_edit(&Map::new(), None)
        .await
        .expect_err("nothing open");
    assert!(matches!(err, ListingError::NoActiveEdit));
}

#[tokio::test]
async fn negative_price_is_rejected_without_persisting() {
    let repo = MemoryRepo::with(catalog());
    let (mut controller, _) = controller(repo.clone());
    let original = controller.open_edit(1).await.expect("edit");

    let mut fields = original.form_fields();
    fields.insert("price".into(), json!(-1));
    fields.insert("name".into(), json!(""));
    let err = controller.submit_edit(&fields, None).await.expect_err("invalid");

    let ListingError::ValidationFailed(errors) = err else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.field_names(), vec!["name", "price"]);
    assert_eq!(controller.editing().validation_errors(), &errors);
    assert!(controller.editing().modal_flags().edit_modal);
    assert_eq!(repo.snapshot()[0], original);
}

#[tokio::test]
async fn unchanged_submit_only_moves_the_updated_timestamp() {
    let repo = MemoryRepo::with(catalog());
    let (mut controller, log) = controller(repo.clone());
    let original = controller.open_edit(2).await.expect("edit");

    let saved = controller
        .submit_edit(&original.form_fields(), None)
        .await
        .expect("save");
    assert!(saved.updated_at > original.updated_at);

    let mut persisted = repo.snapshot()[1].clone();
    persisted.updated_at = original.updated_at;
    assert_eq!(persisted, original);
    assert_eq!(controller.editing().state(), &SessionState::Closed);
    assert_eq!(log.drain()[0].message, "Item updated successfully.");
}

#[tokio::test]
async fn partial_submit_keeps_fields_it_leaves_out() {
    let repo = MemoryRepo::with(catalog());
    let (mut controller, _) = controller(repo.clone());
    let original = controller.open_edit(3).await.expect("edit");

    let fields = Map::from_iter([("price".to_string(), json!(12.5))]);
    let saved = controller.submit_edit(&fields, None).await.expect("save");

    assert_eq!(saved.price, 12.5);
    assert_eq!(saved.name, original.name);
    assert_eq!(saved.sku, original.sku);
    assert_eq!(repo.snapshot()[2], saved);
}

#[tokio::test]
async fn attached_image_is_stored_under_the_slugged_name() {
    let repo = MemoryRepo::with(catalog());
    let files = Arc::new(MemoryFiles::default());
    let mut controller =
        ListQueryController::<Item, _>::new(repo.clone(), admin()).with_file_store(files.clone());
    let original = controller.open_edit(3).await.expect("edit");

    let saved = controller
        .submit_edit(
            &original.form_fields(),
            Some(UploadedFile::new("IMG_0001.PNG", vec![1, 2, 3])),
        )
        .await
        .expect("save");

    assert_eq!(saved.image.as_deref(), Some("steel-chair.png"));
    assert_eq!(
        files.stored.lock().expect("files").as_slice(),
        &[("items".to_string(), "steel-chair.png".to_string(), 3)]
    );
    assert_eq!(repo.snapshot()[2].image.as_deref(), Some("steel-chair.png"));
}

#[tokio::test]
async fn failed_save_keeps_editing_and_raises_error_notification() {
    let repo = MemoryRepo {
        fail_saves: true,
        ..MemoryRepo::with(catalog())
    };
    let (mut controller, log) = controller(repo);
    let original = controller.open_edit(1).await.expect("edit");

    let err = controller
        .submit_edit(&original.form_fields(), None)
        .await
        .expect_err("save fails");
    assert!(matches!(err, ListingError::PersistenceFailed { .. }));
    assert!(controller.editing().modal_flags().edit_modal);
    assert_eq!(log.drain()[0].level, NotificationLevel::Error);
}

struct ScriptedImporter(Vec<RowOutcome>);

#[async_trait]
impl RowImporter for ScriptedImporter {
    async fn parse_and_persist(&self, _bytes: &[u8]) -> anyhow::Result<Vec<RowOutcome>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn import_reports_rejected_rows_without_failing_the_batch() {
    let (controller, log) = controller(MemoryRepo::default());
    let importer = ScriptedImporter(vec![
        RowOutcome { row: 1, status: RowStatus::Imported },
        RowOutcome { row: 2, status: RowStatus::Rejected(vec!["bad price".into()]) },
        RowOutcome { row: 3, status: RowStatus::Imported },
    ]);

    let report = controller.import_from(b"csv", &importer).await.expect("import");
    assert_eq!(report.imported, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].row, 2);
    assert_eq!(log.drain()[0].level, NotificationLevel::Warning);
}

#[tokio::test]
async fn empty_import_file_is_rejected() {
    let (mut controller, _) = controller(MemoryRepo::default());
    controller.open_import().expect("import dialog");
    let err = controller
        .import_from(b"", &ScriptedImporter(vec![]))
        .await
        .expect_err("empty");
    assert!(matches!(err, ListingError::EmptyImportFile));
}

struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn to_spreadsheet(&self, table: &ExportTable) -> anyhow::Result<Vec<u8>> {
        let lines: Vec<String> = table.rows.iter().map(|row| row.join(",")).collect();
        Ok(lines.join("\n").into_bytes())
    }

    fn to_pdf(&self, table: &ExportTable) -> anyhow::Result<Vec<u8>> {
        Ok(format!("%PDF {}", table.rows.len()).into_bytes())
    }
}

#[tokio::test]
async fn export_uses_the_current_filter_and_sort_without_paging() {
    let (mut controller, _) = controller(MemoryRepo::with(catalog()));
    controller.on_search_changed("chair");
    controller.on_sort_requested("name").expect("sort");
    controller.on_sort_requested("name").expect("ascending");

    let artifact = controller
        .export_all(ExportFormat::Spreadsheet, &PlainFormatter)
        .await
        .expect("export");
    assert_eq!(artifact.file_name, "items.csv");
    assert_eq!(
        String::from_utf8(artifact.bytes).expect("utf8"),
        "5,Armchair\n1,Oak Chair\n3,Steel Chair"
    );
}

#[tokio::test]
async fn export_without_grant_is_forbidden() {
    let controller = ListQueryController::<Item, _>::new(MemoryRepo::with(catalog()), viewer());
    let err = controller
        .export_all(ExportFormat::Pdf, &PlainFormatter)
        .await
        .expect_err("forbidden");
    assert!(err.is_forbidden());
}

proptest! {
    #[test]
    fn toggling_twice_restores_the_selection(
        initial in proptest::collection::btree_set(0u32..50, 0..10),
        id in 0u32..50,
    ) {
        let mut selection = BulkSelectionManager::<Item>::new();
        selection.select_all(initial.iter().copied());
        let before = selection.ids();
        selection.toggle(id);
        selection.toggle(id);
        prop_assert_eq!(selection.ids(), before);
    }
}
