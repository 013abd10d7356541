//! Administrative areas for address pickers.
//!
//! Areas form a three-level hierarchy (province, city, district) linked by
//! `parentCode`. They are reference data: imported in bulk, then only read.

use common::DocumentId;
use document_store::{
    Document, DocumentStore, DocumentStoreExt, Filter, FindOptions, Patch, Sort, UpdateOptions,
};
use serde::{Deserialize, Serialize};

use crate::error::{CommerceError, Result};
use crate::retry::ReadRetry;

pub const PROVINCE: u8 = 1;
pub const CITY: u8 = 2;
pub const DISTRICT: u8 = 3;

/// A stored area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: DocumentId,
    /// Administrative code, unique across all levels.
    pub code: String,
    pub name: String,
    pub level: u8,
    #[serde(default)]
    pub parent_code: Option<String>,
}

impl Document for Area {
    const COLLECTION: &'static str = "areas";

    fn id(&self) -> DocumentId {
        self.id
    }
}

/// Input for importing an area.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArea {
    pub code: String,
    pub name: String,
    pub level: u8,
    #[serde(default)]
    pub parent_code: Option<String>,
}

impl NewArea {
    pub fn new(code: &str, name: &str, level: u8, parent_code: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            level,
            parent_code: parent_code.map(str::to_string),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() || self.name.trim().is_empty() {
            return Err(CommerceError::Validation(
                "area code and name are required".to_string(),
            ));
        }
        if !(PROVINCE..=DISTRICT).contains(&self.level) {
            return Err(CommerceError::Validation(format!(
                "area {} has level {}, expected 1 to 3",
                self.code, self.level
            )));
        }
        let has_parent = self
            .parent_code
            .as_deref()
            .is_some_and(|parent| !parent.trim().is_empty());
        if has_parent != (self.level > PROVINCE) {
            return Err(CommerceError::Validation(format!(
                "area {} needs a parent code exactly when it is below province level",
                self.code
            )));
        }
        Ok(())
    }
}

/// Service for reading and importing areas. Every listing is sorted by code.
#[derive(Clone)]
pub struct AreaService<S: DocumentStore> {
    store: S,
    retry: ReadRetry,
}

impl<S: DocumentStore> AreaService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: ReadRetry::default(),
        }
    }

    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    async fn find_sorted(&self, operation: &'static str, filter: Filter) -> Result<Vec<Area>> {
        let areas = self
            .retry
            .run(operation, || {
                self.store
                    .find_documents::<Area>(&filter, FindOptions::new().sort(Sort::asc("code")))
            })
            .await?;
        Ok(areas)
    }

    /// Lists the provinces.
    #[tracing::instrument(skip(self))]
    pub async fn provinces(&self) -> Result<Vec<Area>> {
        self.find_sorted("area_provinces", Filter::new().eq("level", PROVINCE))
            .await
    }

    /// Lists the direct children of `parent_code`. An unknown code has none.
    #[tracing::instrument(skip(self))]
    pub async fn children(&self, parent_code: &str) -> Result<Vec<Area>> {
        self.find_sorted(
            "area_children",
            Filter::new().eq("parentCode", parent_code.trim()),
        )
        .await
    }

    /// Lists provinces and cities together, flat. Districts are left to
    /// [`AreaService::children`].
    #[tracing::instrument(skip(self))]
    pub async fn tree(&self) -> Result<Vec<Area>> {
        self.find_sorted("area_tree", Filter::new().any_of("level", [PROVINCE, CITY]))
            .await
    }

    /// Inserts or refreshes areas keyed by code. Returns how many were written.
    ///
    /// Validates everything before writing anything.
    #[tracing::instrument(skip(self, areas), fields(count = areas.len()))]
    pub async fn import(&self, areas: Vec<NewArea>) -> Result<usize> {
        for area in &areas {
            area.validate()?;
        }

        for area in &areas {
            let filter = Filter::new().eq("code", area.code.trim());
            let patch = Patch::new()
                .set("name", area.name.trim())
                .set("level", area.level)
                .set("parentCode", area.parent_code.as_deref().map(str::trim));
            self.store
                .update_document::<Area>(&filter, &patch, UpdateOptions::upsert())
                .await?;
        }

        tracing::info!(count = areas.len(), "Areas imported");
        Ok(areas.len())
    }
}

/// Provinces plus a handful of major cities and districts, enough for the
/// address picker to work without a full import.
pub fn core_areas() -> Vec<NewArea> {
    const PROVINCES: &[(&str, &str)] = &[
        ("110000", "北京市"),
        ("120000", "天津市"),
        ("130000", "河北省"),
        ("140000", "山西省"),
        ("150000", "内蒙古自治区"),
        ("210000", "辽宁省"),
        ("220000", "吉林省"),
        ("230000", "黑龙江省"),
        ("310000", "上海市"),
        ("320000", "江苏省"),
        ("330000", "浙江省"),
        ("340000", "安徽省"),
        ("350000", "福建省"),
        ("360000", "江西省"),
        ("370000", "山东省"),
        ("410000", "河南省"),
        ("420000", "湖北省"),
        ("430000", "湖南省"),
        ("440000", "广东省"),
        ("450000", "广西壮族自治区"),
        ("460000", "海南省"),
        ("500000", "重庆市"),
        ("510000", "四川省"),
        ("520000", "贵州省"),
        ("530000", "云南省"),
        ("540000", "西藏自治区"),
        ("610000", "陕西省"),
        ("620000", "甘肃省"),
        ("630000", "青海省"),
        ("640000", "宁夏回族自治区"),
        ("650000", "新疆维吾尔自治区"),
        ("710000", "台湾省"),
        ("810000", "香港特别行政区"),
        ("820000", "澳门特别行政区"),
    ];
    const CITIES: &[(&str, &str, &str)] = &[
        ("110100", "北京市", "110000"),
        ("310100", "上海市", "310000"),
        ("440100", "广州市", "440000"),
        ("440300", "深圳市", "440000"),
        ("330100", "杭州市", "330000"),
        ("320100", "南京市", "320000"),
        ("510100", "成都市", "510000"),
        ("420100", "武汉市", "420000"),
        ("610100", "西安市", "610000"),
    ];
    const DISTRICTS: &[(&str, &str, &str)] = &[
        ("440305", "南山区", "440300"),
        ("440304", "福田区", "440300"),
        ("110101", "东城区", "110100"),
        ("110105", "朝阳区", "110100"),
    ];

    let provinces = PROVINCES
        .iter()
        .map(|(code, name)| NewArea::new(code, name, PROVINCE, None));
    let cities = CITIES
        .iter()
        .map(|(code, name, parent)| NewArea::new(code, name, CITY, Some(parent)));
    let districts = DISTRICTS
        .iter()
        .map(|(code, name, parent)| NewArea::new(code, name, DISTRICT, Some(parent)));
    provinces.chain(cities).chain(districts).collect()
}

#[cfg(test)]
mod tests {
    use document_store::InMemoryDocumentStore;

    use super::*;

    async fn seeded() -> (AreaService<InMemoryDocumentStore>, InMemoryDocumentStore) {
        let store = InMemoryDocumentStore::new();
        crate::ensure_indexes(&store).await.unwrap();
        let areas = AreaService::new(store.clone());
        areas.import(core_areas()).await.unwrap();
        (areas, store)
    }

    fn codes(areas: &[Area]) -> Vec<&str> {
        areas.iter().map(|a| a.code.as_str()).collect()
    }

    #[tokio::test]
    async fn test_provinces_sorted_by_code() {
        let (areas, _) = seeded().await;

        let provinces = areas.provinces().await.unwrap();
        assert_eq!(provinces.len(), 34);
        assert_eq!(provinces[0].code, "110000");
        assert_eq!(provinces[33].code, "820000");
        assert!(provinces.iter().all(|a| a.level == PROVINCE && a.parent_code.is_none()));
        assert!(provinces.windows(2).all(|w| w[0].code < w[1].code));
    }

    #[tokio::test]
    async fn test_children_of_city_and_unknown_parent() {
        let (areas, _) = seeded().await;

        let shenzhen = areas.children("440300").await.unwrap();
        assert_eq!(codes(&shenzhen), vec!["440304", "440305"]);
        assert_eq!(shenzhen[1].name, "南山区");

        let guangdong = areas.children("440000").await.unwrap();
        assert_eq!(codes(&guangdong), vec!["440100", "440300"]);

        assert!(areas.children("999999").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tree_excludes_districts() {
        let (areas, _) = seeded().await;

        let tree = areas.tree().await.unwrap();
        assert_eq!(tree.len(), 34 + 9);
        assert!(tree.iter().all(|a| a.level <= CITY));
        assert!(tree.windows(2).all(|w| w[0].code < w[1].code));
        assert_eq!(codes(&tree[..2]), vec!["110000", "110100"]);
    }

    #[tokio::test]
    async fn test_import_is_keyed_by_code() {
        let (areas, store) = seeded().await;
        let before = store.document_count(Area::COLLECTION).await;

        areas.import(core_areas()).await.unwrap();
        areas
            .import(vec![NewArea::new("440300", "深圳", CITY, Some("440000"))])
            .await
            .unwrap();

        assert_eq!(store.document_count(Area::COLLECTION).await, before);
        let guangdong = areas.children("440000").await.unwrap();
        assert_eq!(guangdong[1].name, "深圳");
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_areas_before_writing() {
        let store = InMemoryDocumentStore::new();
        let areas = AreaService::new(store.clone());

        let orphan_city = vec![
            NewArea::new("110000", "北京市", PROVINCE, None),
            NewArea::new("110100", "北京市", CITY, None),
        ];
        assert!(matches!(
            areas.import(orphan_city).await,
            Err(CommerceError::Validation(_))
        ));

        let bad_level = vec![NewArea::new("990000", "Nowhere", 4, Some("110000"))];
        assert!(matches!(
            areas.import(bad_level).await,
            Err(CommerceError::Validation(_))
        ));

        let province_with_parent = vec![NewArea::new("990000", "Nowhere", PROVINCE, Some("110000"))];
        assert!(matches!(
            areas.import(province_with_parent).await,
            Err(CommerceError::Validation(_))
        ));

        assert_eq!(store.document_count(Area::COLLECTION).await, 0);
    }
}
