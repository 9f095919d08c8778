//! In-memory catalog backend. Filters are applied exactly; ranking is
//! availability, then rating, then review count. Serves as the demo
//! binding and as the fixture backend for tests.

use async_trait::async_trait;

use aisle_registry::{Domain, SlotValue};

use crate::backend::{SearchBackend, SearchError, SearchOutcome, SearchQuery};
use crate::product::ProductSummary;

pub struct StaticCatalog {
    domain: Domain,
    products: Vec<ProductSummary>,
}

impl StaticCatalog {
    pub fn new(domain: Domain, products: Vec<ProductSummary>) -> Self {
        Self { domain, products }
    }

    /// A small built-in inventory so the server runs out of the box.
    pub fn sample(domain: Domain) -> Self {
        let products = match domain {
            Domain::Vehicles => sample_vehicles(),
            Domain::Laptops => sample_laptops(),
            Domain::Books => sample_books(),
            Domain::Unknown => Vec::new(),
        };
        Self::new(domain, products)
    }

    fn matches(&self, product: &ProductSummary, key: &str, value: &SlotValue) -> bool {
        match value {
            SlotValue::Price(band) => band.contains(product.price),
            SlotValue::Int(wanted) => {
                // Integer slots are minimums: "16 GB" means at least 16.
                product.attr_int(key).map(|have| have >= *wanted).unwrap_or(false)
            }
            SlotValue::Text(wanted) => product
                .attr(key)
                .map(|have| have.eq_ignore_ascii_case(wanted))
                .unwrap_or(false),
        }
    }
}

#[async_trait]
impl SearchBackend for StaticCatalog {
    async fn search(&self, query: &SearchQuery, limit: usize) -> Result<SearchOutcome, SearchError> {
        let mut hits: Vec<&ProductSummary> = self
            .products
            .iter()
            .filter(|product| {
                query
                    .filters
                    .iter()
                    .all(|(key, value)| self.matches(product, key, value))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.available
                .cmp(&a.available)
                .then(b.rating.total_cmp(&a.rating))
                .then(b.reviews_count.cmp(&a.reviews_count))
        });

        Ok(SearchOutcome {
            candidates: hits.into_iter().take(limit).cloned().collect(),
            provenance: format!("static-catalog/{}", self.domain),
        })
    }

    fn describe(&self) -> String {
        format!("static-catalog/{} ({} products)", self.domain, self.products.len())
    }
}

macro_rules! product {
    ($id:expr, $type:expr, $name:expr, $brand:expr, $price:expr, $rating:expr, $reviews:expr, $block:ident : $detail:tt) => {
        ProductSummary {
            id: $id.to_string(),
            product_type: $type.to_string(),
            name: $name.to_string(),
            brand: $brand.to_string(),
            price: $price,
            rating: $rating,
            reviews_count: $reviews,
            description: format!("{} by {}", $name, $brand),
            $block: Some(serde_json::json!($detail)),
            ..Default::default()
        }
    };
}

fn sample_laptops() -> Vec<ProductSummary> {
    vec![
        product!("lp-01", "laptop", "Inspiron 14", "Dell", 74_900, 4.2, 812, laptop: {"use_case": "general", "gpu_vendor": "Intel", "ram_gb": 16, "screen_size": "14"}),
        product!("lp-02", "laptop", "XPS 15", "Dell", 189_900, 4.6, 1543, laptop: {"use_case": "creative", "gpu_vendor": "NVIDIA", "ram_gb": 32, "screen_size": "15"}),
        product!("lp-03", "laptop", "G15 Gaming", "Dell", 129_900, 4.4, 977, laptop: {"use_case": "gaming", "gpu_vendor": "NVIDIA", "ram_gb": 16, "screen_size": "15"}),
        product!("lp-04", "laptop", "Legion 5", "Lenovo", 139_900, 4.5, 2011, laptop: {"use_case": "gaming", "gpu_vendor": "NVIDIA", "ram_gb": 16, "screen_size": "15"}),
        product!("lp-05", "laptop", "ThinkPad X1", "Lenovo", 219_900, 4.7, 1688, laptop: {"use_case": "work", "gpu_vendor": "Intel", "ram_gb": 32, "screen_size": "14"}),
        product!("lp-06", "laptop", "IdeaPad 3", "Lenovo", 54_900, 4.0, 3120, laptop: {"use_case": "school", "gpu_vendor": "AMD", "ram_gb": 8, "screen_size": "15"}),
        product!("lp-07", "laptop", "ROG Zephyrus", "Asus", 179_900, 4.6, 1432, laptop: {"use_case": "gaming", "gpu_vendor": "NVIDIA", "ram_gb": 16, "screen_size": "14"}),
        product!("lp-08", "laptop", "ZenBook 14", "Asus", 99_900, 4.3, 908, laptop: {"use_case": "work", "gpu_vendor": "Intel", "ram_gb": 16, "screen_size": "14"}),
        product!("lp-09", "laptop", "TUF A15", "Asus", 109_900, 4.2, 1276, laptop: {"use_case": "gaming", "gpu_vendor": "NVIDIA", "ram_gb": 16, "screen_size": "15"}),
        product!("lp-10", "laptop", "Pavilion 15", "HP", 84_900, 4.1, 1754, laptop: {"use_case": "general", "gpu_vendor": "AMD", "ram_gb": 16, "screen_size": "15"}),
        product!("lp-11", "laptop", "Omen 16", "HP", 149_900, 4.4, 865, laptop: {"use_case": "gaming", "gpu_vendor": "NVIDIA", "ram_gb": 16, "screen_size": "16"}),
        product!("lp-12", "laptop", "MacBook Air", "Apple", 119_900, 4.8, 5230, laptop: {"use_case": "general", "gpu_vendor": "Apple", "ram_gb": 16, "screen_size": "13"}),
        product!("lp-13", "laptop", "MacBook Pro 14", "Apple", 199_900, 4.8, 3140, laptop: {"use_case": "creative", "gpu_vendor": "Apple", "ram_gb": 32, "screen_size": "14"}),
        product!("lp-14", "laptop", "Swift 3", "Acer", 64_900, 4.0, 1422, laptop: {"use_case": "school", "gpu_vendor": "Intel", "ram_gb": 8, "screen_size": "14"}),
        product!("lp-15", "laptop", "Nitro 5", "Acer", 94_900, 4.2, 2688, laptop: {"use_case": "gaming", "gpu_vendor": "NVIDIA", "ram_gb": 16, "screen_size": "15"}),
    ]
}

fn sample_vehicles() -> Vec<ProductSummary> {
    vec![
        product!("vh-01", "vehicle", "RAV4", "Toyota", 3_150_000, 4.6, 2120, vehicle: {"body_style": "suv", "fuel_type": "hybrid", "color": "silver"}),
        product!("vh-02", "vehicle", "Camry", "Toyota", 2_850_000, 4.5, 3302, vehicle: {"body_style": "sedan", "fuel_type": "gas", "color": "white"}),
        product!("vh-03", "vehicle", "Corolla", "Toyota", 2_250_000, 4.4, 4110, vehicle: {"body_style": "sedan", "fuel_type": "gas", "color": "blue"}),
        product!("vh-04", "vehicle", "CR-V", "Honda", 3_050_000, 4.5, 1987, vehicle: {"body_style": "suv", "fuel_type": "hybrid", "color": "gray"}),
        product!("vh-05", "vehicle", "Civic", "Honda", 2_450_000, 4.6, 3764, vehicle: {"body_style": "sedan", "fuel_type": "gas", "color": "black"}),
        product!("vh-06", "vehicle", "F-150", "Ford", 4_250_000, 4.4, 2859, vehicle: {"body_style": "truck", "fuel_type": "gas", "color": "black"}),
        product!("vh-07", "vehicle", "Escape", "Ford", 2_950_000, 4.1, 1218, vehicle: {"body_style": "suv", "fuel_type": "hybrid", "color": "red"}),
        product!("vh-08", "vehicle", "Silverado", "Chevrolet", 4_150_000, 4.3, 1764, vehicle: {"body_style": "truck", "fuel_type": "diesel", "color": "white"}),
        product!("vh-09", "vehicle", "Equinox", "Chevrolet", 2_750_000, 4.0, 980, vehicle: {"body_style": "suv", "fuel_type": "gas", "color": "silver"}),
        product!("vh-10", "vehicle", "Model 3", "Tesla", 3_950_000, 4.7, 5121, vehicle: {"body_style": "sedan", "fuel_type": "electric", "color": "white"}),
        product!("vh-11", "vehicle", "Model Y", "Tesla", 4_450_000, 4.6, 4230, vehicle: {"body_style": "suv", "fuel_type": "electric", "color": "gray"}),
        product!("vh-12", "vehicle", "Outback", "Subaru", 3_250_000, 4.5, 2101, vehicle: {"body_style": "suv", "fuel_type": "gas", "color": "blue"}),
        product!("vh-13", "vehicle", "3 Series", "BMW", 4_550_000, 4.5, 1320, vehicle: {"body_style": "sedan", "fuel_type": "gas", "color": "black"}),
        product!("vh-14", "vehicle", "X3", "BMW", 4_850_000, 4.4, 1110, vehicle: {"body_style": "suv", "fuel_type": "gas", "color": "white"}),
    ]
}

fn sample_books() -> Vec<ProductSummary> {
    vec![
        product!("bk-01", "book", "The Silent Patient", "Celadon", 1_499, 4.5, 12110, book: {"genre": "thriller", "format": "paperback", "length": "medium"}),
        product!("bk-02", "book", "Gone Girl", "Crown", 1_299, 4.2, 18933, book: {"genre": "mystery", "format": "paperback", "length": "long"}),
        product!("bk-03", "book", "The Big Sleep", "Vintage", 1_099, 4.3, 4521, book: {"genre": "mystery", "format": "paperback", "length": "short"}),
        product!("bk-04", "book", "Project Hail Mary", "Ballantine", 1_899, 4.8, 22140, book: {"genre": "sci-fi", "format": "hardcover", "length": "long"}),
        product!("bk-05", "book", "Dune", "Ace", 1_199, 4.7, 31020, book: {"genre": "sci-fi", "format": "paperback", "length": "long"}),
        product!("bk-06", "book", "The Name of the Wind", "DAW", 1_399, 4.7, 15544, book: {"genre": "fantasy", "format": "paperback", "length": "long"}),
        product!("bk-07", "book", "Mistborn", "Tor", 1_299, 4.6, 14233, book: {"genre": "fantasy", "format": "paperback", "length": "long"}),
        product!("bk-08", "book", "The Thursday Murder Club", "Penguin", 1_599, 4.3, 9877, book: {"genre": "mystery", "format": "hardcover", "length": "medium"}),
        product!("bk-09", "book", "Educated", "Random House", 1_499, 4.7, 19822, book: {"genre": "biography", "format": "paperback", "length": "medium"}),
        product!("bk-10", "book", "Atomic Habits", "Avery", 1_699, 4.8, 41233, book: {"genre": "self-help", "format": "hardcover", "length": "medium"}),
        product!("bk-11", "book", "SPQR", "Liveright", 1_799, 4.4, 6521, book: {"genre": "history", "format": "paperback", "length": "long"}),
        product!("bk-12", "book", "The Maid", "Ballantine", 1_399, 4.2, 8712, book: {"genre": "mystery", "format": "ebook", "length": "medium"}),
    ]
}
