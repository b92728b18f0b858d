// Entity stages
//
// Each registry entity has its own cleansing stage:
// - Companies: capital normalization + size tier filter
// - Ventures: active filter, recodes, dates, secondary CNAE
// - Reference tables: code → description lookups

pub mod company;
pub mod reference;
pub mod venture;

pub use company::{add_size_classification, classify_companies, COMPANY_OUTPUT_COLUMNS};
pub use reference::{
    load_countries, load_industry_classes, load_municipalities, load_reference, ReferenceTables,
};
pub use venture::{first_code, normalize_ventures, recode, ACTIVE_STATUS};
