use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::error::Result;
use crate::product::Product;

/// Header row of the downloadable import template
pub const TEMPLATE_HEADERS: [&str; 4] = ["S/N", "Item Name", "Quantity", "Category"];

/// Header row of a catalog export
pub const EXPORT_HEADERS: [&str; 5] = ["S/N", "Item Name", "Price", "Quantity", "Category"];

/// Build the batch-import template
///
/// An XLSX workbook holding only the header row users fill in before
/// uploading. The "S/N" column is ignored on import.
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an export error
///
/// # Examples
/// ```
/// use inventory::downloader::import_template;
///
/// let bytes = import_template().unwrap();
/// assert!(bytes.starts_with(b"PK"));
/// ```
pub fn import_template() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    write_header(&mut worksheet, &TEMPLATE_HEADERS)?;
    workbook.push_worksheet(worksheet);

    Ok(workbook.save_to_buffer()?)
}

/// Convert the catalog to CSV format
///
/// One line per product under [`EXPORT_HEADERS`], serial numbers starting at
/// 1. Fields containing commas, quotes or newlines are quoted.
pub fn to_csv<'a>(products: impl IntoIterator<Item = &'a Product>) -> String {
    let mut csv_content = EXPORT_HEADERS.join(",");
    csv_content.push('\n');

    for (index, product) in products.into_iter().enumerate() {
        let fields = [
            (index + 1).to_string(),
            escape_csv(&product.item_name),
            product.price.to_string(),
            product.quantity.to_string(),
            escape_csv(product.category.label()),
        ];
        csv_content.push_str(&fields.join(","));
        csv_content.push('\n');
    }

    csv_content
}

/// Convert the catalog to XLSX format
///
/// Same layout as [`to_csv`], with numeric cells for serial number, price and
/// quantity.
pub fn to_xlsx<'a>(products: impl IntoIterator<Item = &'a Product>) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    write_header(&mut worksheet, &EXPORT_HEADERS)?;

    for (index, product) in products.into_iter().enumerate() {
        let row = (index + 1) as u32;
        worksheet.write_number(row, 0, (index + 1) as f64)?;
        worksheet.write_string(row, 1, product.item_name.as_str())?;
        worksheet.write_number(row, 2, product.price)?;
        worksheet.write_number(row, 3, product.quantity as f64)?;
        worksheet.write_string(row, 4, product.category.label())?;
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}

fn write_header(worksheet: &mut Worksheet, headers: &[&str]) -> Result<()> {
    let bold = Format::new().set_bold();
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    Ok(())
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Category, ProductId};

    fn product(id: u64, name: &str, category: Category) -> Product {
        Product {
            id: ProductId(id),
            item_name: name.to_string(),
            price: 2.5,
            quantity: 4,
            category,
        }
    }

    #[test]
    fn csv_numbers_rows_and_escapes() {
        let products = vec![
            product(1, "Rice", Category::FoodStuff),
            product(2, "Chips, salted", Category::Snacks),
        ];
        let csv = to_csv(&products);
        assert_eq!(
            csv,
            "S/N,Item Name,Price,Quantity,Category\n\
             1,Rice,2.5,4,Food Stuff\n\
             2,\"Chips, salted\",2.5,4,Snacks\n"
        );
    }

    #[test]
    fn empty_catalog_exports_header_only() {
        assert_eq!(to_csv(&Vec::new()), "S/N,Item Name,Price,Quantity,Category\n");
        assert!(to_xlsx(&Vec::new()).unwrap().starts_with(b"PK"));
    }
}
