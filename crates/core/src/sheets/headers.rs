//! Header row auto-detection
//!
//! Maps well-known header labels (English and French, compared folded) to
//! sheet fields when a spreadsheet was linked without an explicit mapping.

use orderlink_domain::{ColumnMapping, SheetField};

use super::reader::column_letter;
use crate::utils::text::fold;

const SYNONYMS: &[(SheetField, &[&str])] = &[
    (SheetField::Reference, &["reference", "ref", "order id", "order number", "n commande", "numero commande", "id commande"]),
    (SheetField::Date, &["date", "order date", "date commande", "created at"]),
    (SheetField::CustomerName, &["name", "customer", "customer name", "full name", "nom", "client", "nom client", "nom complet"]),
    (SheetField::Phone, &["phone", "phone number", "telephone", "tel", "mobile", "gsm", "numero"]),
    (SheetField::AltPhone, &["phone 2", "alt phone", "second phone", "telephone 2", "tel 2"]),
    (SheetField::Email, &["email", "e mail", "mail", "courriel"]),
    (SheetField::Address, &["address", "adresse", "shipping address", "adresse livraison"]),
    (SheetField::City, &["city", "ville", "town"]),
    (SheetField::PostalCode, &["postal code", "zip", "zip code", "code postal"]),
    (SheetField::ProductName, &["product", "product name", "item", "produit", "nom produit", "article"]),
    (SheetField::ProductSku, &["sku", "product sku", "code produit", "reference produit"]),
    (SheetField::Quantity, &["quantity", "qty", "quantite", "qte"]),
    (SheetField::Variant, &["variant", "variante", "size", "taille", "color", "couleur"]),
    (SheetField::Price, &["price", "total", "amount", "prix", "montant", "total price", "prix total"]),
    (SheetField::Notes, &["notes", "note", "comment", "comments", "commentaire", "remarque"]),
    (SheetField::Status, &["status", "statut", "etat", "sync status"]),
    (SheetField::Error, &["error", "errors", "erreur", "sync error"]),
];

fn field_for(label: &str) -> Option<SheetField> {
    let folded = fold(label);
    if folded.is_empty() {
        return None;
    }
    SYNONYMS
        .iter()
        .find(|(_, names)| names.iter().any(|name| *name == folded))
        .map(|(field, _)| *field)
}

/// Build a mapping from a header row. The first column claiming a field
/// wins; unrecognised headers are ignored.
#[must_use]
pub fn detect_mapping(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    for (index, label) in headers.iter().enumerate() {
        if let Some(field) = field_for(label) {
            if mapping.column_for(field).is_none() {
                mapping.set(field, &column_letter(index));
            }
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(labels: &[&str]) -> Vec<String> {
        labels.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn detects_french_headers() {
        let mapping = detect_mapping(&row(&["Nom complet", "Téléphone", "Adresse", "Ville", "Produit", "Prix", "Quantité"]));
        assert_eq!(mapping.column_for(SheetField::CustomerName), Some("A"));
        assert_eq!(mapping.column_for(SheetField::Phone), Some("B"));
        assert_eq!(mapping.column_for(SheetField::City), Some("D"));
        assert_eq!(mapping.column_for(SheetField::Quantity), Some("G"));
    }

    #[test]
    fn first_matching_column_wins() {
        let mapping = detect_mapping(&row(&["", "Phone", "Tel", "Status"]));
        assert_eq!(mapping.column_for(SheetField::Phone), Some("B"));
        assert_eq!(mapping.column_for(SheetField::Status), Some("D"));
    }

    #[test]
    fn unknown_headers_are_ignored() {
        assert!(detect_mapping(&row(&["foo", "bar"])).is_empty());
    }
}
