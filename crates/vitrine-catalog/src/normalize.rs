//! Normalisation of loosely-typed catalog JSON.
//!
//! Feeds and exports disagree on field names and types: ids may be numbers,
//! prices may be strings with a currency sign, images may be a string, a
//! list, or a list of objects. [`normalize_product`] accepts all of these.

use serde_json::{Map, Value};
use std::path::Path;
use vitrine_core::{Error, ProductRecord, Result};

/// Build a [`ProductRecord`] from a JSON object.
///
/// `default_source` is used when the object has no `source` field.
///
/// # Errors
///
/// `InvalidData` when the value is not an object or lacks an id or title.
pub fn normalize_product(raw: &Value, default_source: &str) -> Result<ProductRecord> {
    let object = raw
        .as_object()
        .ok_or_else(|| Error::invalid_data("product entry is not a JSON object"))?;
    let field = |names: &[&str]| first_present(object, names);

    let id = field(&["id", "product_id", "sku"])
        .and_then(scalar_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_data("product entry has no id"))?;
    let title = field(&["title", "name"])
        .and_then(scalar_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_data(format!("product {id} has no title")))?;

    let mut record = ProductRecord::new(id, title);
    record.description = field(&["description", "body"])
        .and_then(scalar_string)
        .filter(|s| !s.is_empty());
    record.price = field(&["price", "sale_price"]).and_then(number).unwrap_or(0.0);
    record.category = field(&["category", "product_type"])
        .and_then(scalar_string)
        .unwrap_or_default();
    record.brand = field(&["brand", "vendor"])
        .and_then(scalar_string)
        .unwrap_or_default();
    record.image_url = field(&["image_url", "image", "images"])
        .and_then(image_reference)
        .unwrap_or_default();
    record.rating = field(&["rating"]).and_then(number).map(|r| r as f32);
    record.review_count = field(&["review_count", "reviews"])
        .and_then(number)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u32);
    record.source = field(&["source"])
        .and_then(scalar_string)
        .unwrap_or_else(|| default_source.to_string());
    record.purchase_url = field(&["purchase_url", "buy_url", "url"]).and_then(scalar_string);
    record.image_hash = field(&["image_hash"]).and_then(scalar_string);
    Ok(record)
}

/// Read a catalog file: a JSON array of products or `{"products": [...]}`.
///
/// Entries that do not normalise are logged and skipped.
pub fn load_catalog_file(path: impl AsRef<Path>, default_source: &str) -> Result<Vec<ProductRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
    let value: Value = serde_json::from_str(&text)?;

    let entries = match &value {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("products") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(Error::invalid_data(format!(
                    "{}: expected an array or a 'products' array",
                    path.display()
                )));
            }
        },
        _ => {
            return Err(Error::invalid_data(format!(
                "{}: expected an array or a 'products' array",
                path.display()
            )));
        }
    };

    let mut products = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match normalize_product(entry, default_source) {
            Ok(product) => products.push(product),
            Err(e) => log::warn!("Skipping catalog entry {i} in {}: {e}", path.display()),
        }
    }
    log::info!("Loaded {} products from {}", products.len(), path.display());
    Ok(products)
}

fn first_present<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|n| object.get(*n).filter(|v| !v.is_null()))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn image_reference(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(image_reference),
        Value::Object(map) => ["url", "src"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(image_reference),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_full_entry() {
        let raw = json!({
            "id": "P-1",
            "title": " Red Dress ",
            "description": "Silk",
            "price": 49.5,
            "category": "Dresses",
            "brand": "Zara",
            "image": "https://img/1.jpg",
            "rating": 4.5,
            "review_count": 12,
            "buy_url": "https://shop/p1"
        });
        let p = normalize_product(&raw, "feed").unwrap();
        assert_eq!(p.id, "P-1");
        assert_eq!(p.title, "Red Dress");
        assert_eq!(p.description.as_deref(), Some("Silk"));
        assert_eq!(p.price, 49.5);
        assert_eq!(p.category, "Dresses");
        assert_eq!(p.brand, "Zara");
        assert_eq!(p.image_url, "https://img/1.jpg");
        assert_eq!(p.rating, Some(4.5));
        assert_eq!(p.review_count, Some(12));
        assert_eq!(p.source, "feed");
        assert_eq!(p.purchase_url.as_deref(), Some("https://shop/p1"));
        assert!(p.text_embedding.is_none());
    }

    #[test]
    fn test_normalize_loose_types() {
        let raw = json!({
            "product_id": 42,
            "name": "Lamp",
            "price": "$1,299.00",
            "vendor": "Ikea",
            "images": [{"src": "https://img/lamp.png"}],
            "source": "ikea"
        });
        let p = normalize_product(&raw, "feed").unwrap();
        assert_eq!(p.id, "42");
        assert_eq!(p.title, "Lamp");
        assert_eq!(p.price, 1299.0);
        assert_eq!(p.brand, "Ikea");
        assert_eq!(p.image_url, "https://img/lamp.png");
        assert_eq!(p.source, "ikea");
        assert_eq!(p.rating, None);
    }

    #[test]
    fn test_normalize_defaults_and_bad_values() {
        let raw = json!({"id": "x", "title": "X", "price": "n/a", "rating": null, "review_count": -3});
        let p = normalize_product(&raw, "feed").unwrap();
        assert_eq!(p.price, 0.0);
        assert_eq!(p.rating, None);
        assert_eq!(p.review_count, None);
        assert_eq!(p.category, "");
    }

    #[test]
    fn test_normalize_requires_id_and_title() {
        assert!(matches!(
            normalize_product(&json!({"title": "X"}), "feed"),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            normalize_product(&json!({"id": "1", "title": ""}), "feed"),
            Err(Error::InvalidData(_))
        ));
        assert!(normalize_product(&json!(["not", "an", "object"]), "feed").is_err());
    }

    #[test]
    fn test_load_catalog_file_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let array = dir.path().join("array.json");
        std::fs::write(&array, r#"[{"id": "a", "title": "A"}, {"title": "no id"}]"#).unwrap();
        let products = load_catalog_file(&array, "file").unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].source, "file");

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"products": [{"id": 1, "title": "One"}]}"#).unwrap();
        assert_eq!(load_catalog_file(&wrapped, "file").unwrap()[0].id, "1");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"items": []}"#).unwrap();
        assert!(matches!(load_catalog_file(&bad, "file"), Err(Error::InvalidData(_))));

        assert!(matches!(
            load_catalog_file(dir.path().join("missing.json"), "file"),
            Err(Error::IoWithPath { .. })
        ));
    }
}
