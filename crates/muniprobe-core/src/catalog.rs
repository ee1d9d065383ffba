//! Built-in probes for a handful of municipal endpoints

use crate::descriptor::{ParamBinding, ProbeDescriptor, RequestShape, ValueSource};
use crate::runner::Scenario;
use crate::transport::Method;

const PAGE_FIELDS: [&str; 4] = ["page_number", "page_size", "total_items", "items"];

/// Provider search; retried without filters if the filtered search fails
#[must_use]
pub fn provider_search() -> ProbeDescriptor {
    ProbeDescriptor::new("provider search", Method::Get, "/proveedores")
        .with_primary(
            RequestShape::new()
                .params_from("provider_search_params")
                .param(ParamBinding::optional("cuit", "identity_tax_id")),
        )
        .with_fallback(RequestShape::new().params_from("provider_search_params_minimal"))
        .expect_fields(PAGE_FIELDS)
        .with_tolerance(1)
        .extract("/items/0/id", "provider_id")
}

/// Address creation from a random variant; publishes the new id
#[must_use]
pub fn address_create() -> ProbeDescriptor {
    ProbeDescriptor::new("address create", Method::Post, "/domicilios")
        .with_primary(RequestShape::new().body(ValueSource::Variants("address_variants".into())))
        .with_fallback(RequestShape::new().body(ValueSource::Fixed("address_body".into())))
        .expect_fields(["id", "calle", "altura", "localidad_id"])
        .with_tolerance(2)
        .extract("/id", "address_id")
}

/// Address lookup by id
#[must_use]
pub fn address_lookup() -> ProbeDescriptor {
    ProbeDescriptor::new("address lookup", Method::Get, "/domicilios/{address_id}")
        .expect_fields(["id", "calle", "altura"])
        .with_tolerance(1)
}

/// Bank lookup by id
#[must_use]
pub fn bank_lookup() -> ProbeDescriptor {
    ProbeDescriptor::new("bank lookup", Method::Get, "/bancos/{bank_id}")
        .expect_fields(["id", "nombre"])
}

/// Person lookup by tax id
#[must_use]
pub fn person_lookup() -> ProbeDescriptor {
    ProbeDescriptor::new("person lookup", Method::Get, "/personas")
        .with_primary(
            RequestShape::new()
                .params_from("person_search_params")
                .param(ParamBinding::required("cuit", "identity_tax_id")),
        )
        .with_fallback(RequestShape::new().param(ParamBinding::required("cuit", "identity_tax_id")))
        .expect_fields(PAGE_FIELDS)
        .with_tolerance(1)
        .extract("/items/0/id", "person_id")
}

/// All catalog probes, address creation before lookup
#[must_use]
pub fn all() -> Vec<ProbeDescriptor> {
    vec![
        provider_search(),
        address_create(),
        address_lookup(),
        bank_lookup(),
        person_lookup(),
    ]
}

/// Catalog probes as a scenario
#[must_use]
pub fn default_scenario() -> Scenario {
    all()
        .into_iter()
        .fold(Scenario::new("municipal catalog"), Scenario::with_probe)
}
