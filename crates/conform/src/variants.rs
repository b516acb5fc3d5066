//! Request variant families
//!
//! Every member is exercised with a fixed, ordered family of requests: correct
//! identifier casing, an extra unknown parameter, mis-cased identifiers,
//! malformed identifier values and, for members that take arguments, a bad
//! value and an inverted-case name for each argument. The labels produced
//! here appear verbatim in reports.

use alpaca_conform_common::{
    ExpectedStatusSet, HttpVerb, Parameter, CLIENT_ID, CLIENT_TRANSACTION_ID,
};

use crate::error::{ConformError, ConformResult};

pub const TEST_CLIENT_ID: u32 = 123456;
pub const TEST_TRANSACTION_ID: u32 = 67890;

/// Syntactically invalid value for any business parameter
pub const BAD_PARAMETER_VALUE: &str = "asduio6fghZZ";

pub const EXTRA_PARAMETER_NAME: &str = "ExtraParameter";
pub const EXTRA_PARAMETER_VALUE: &str = "ExtraValue";

/// A member argument with its correct value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessParameter {
    pub name: String,
    pub value: String,
    /// Whether to send `BAD_PARAMETER_VALUE` for this argument
    pub test_bad_value: bool,
}

impl BusinessParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            test_bad_value: true,
        }
    }

    pub fn without_bad_value(mut self) -> Self {
        self.test_bad_value = false;
        self
    }

    fn as_parameter(&self) -> Parameter {
        Parameter::new(&self.name, &self.value)
    }
}

/// One deliberately constructed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub label: String,
    pub parameters: Vec<Parameter>,
    pub expected: ExpectedStatusSet,
    /// A 200 carrying an InvalidValue error also passes
    pub accept_invalid_value: bool,
    /// The transaction id name is mis-cased, so a returned id of 0 is conformant
    pub badly_cased_transaction_id: bool,
}

impl Variant {
    fn new(label: impl Into<String>, parameters: Vec<Parameter>, expected: ExpectedStatusSet) -> Self {
        Self {
            label: label.into(),
            parameters,
            expected,
            accept_invalid_value: false,
            badly_cased_transaction_id: false,
        }
    }

    fn accepting_invalid_value(mut self) -> Self {
        self.accept_invalid_value = true;
        self
    }

    fn with_badly_cased_transaction_id(mut self) -> Self {
        self.badly_cased_transaction_id = true;
        self
    }

    /// Variants expected to succeed are followed by the member's completion wait
    pub fn expects_success(&self) -> bool {
        self.expected.is_ok_only()
    }
}

/// Flip the case of every cased character, leaving everything else alone.
///
/// Characters whose case mapping is not a single character are kept so the
/// result always has the same length as the input.
pub fn invert_casing(s: &str) -> String {
    s.chars()
        .map(|c| {
            let upper = single_char(c.to_uppercase());
            if upper == Some(c) {
                single_char(c.to_lowercase()).unwrap_or(c)
            } else {
                upper.unwrap_or(c)
            }
        })
        .collect()
}

fn single_char(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    let first = mapped.next()?;
    match mapped.next() {
        Some(_) => None,
        None => Some(first),
    }
}

fn ids(client_id: (&str, &str), transaction_id: (&str, &str)) -> Vec<Parameter> {
    vec![
        Parameter::new(client_id.0, client_id.1),
        Parameter::new(transaction_id.0, transaction_id.1),
    ]
}

fn ids_ok() -> Vec<Parameter> {
    ids(
        (CLIENT_ID, &TEST_CLIENT_ID.to_string()),
        (CLIENT_TRANSACTION_ID, &TEST_TRANSACTION_ID.to_string()),
    )
}

/// Correctly cased identifiers, used by single requests
pub fn standard_parameters() -> Vec<Parameter> {
    ids_ok()
}

fn with_business(mut base: Vec<Parameter>, business: impl IntoIterator<Item = Parameter>) -> Vec<Parameter> {
    base.extend(business);
    base
}

/// The eight malformed identifier variants, each carrying the business parameters unchanged
pub fn bad_id_values(business: &[BusinessParameter]) -> Vec<Variant> {
    let client_id = TEST_CLIENT_ID.to_string();
    let transaction_id = TEST_TRANSACTION_ID.to_string();

    let cases: [(&str, Vec<Parameter>); 8] = [
        ("ClientID is empty", ids((CLIENT_ID, ""), (CLIENT_TRANSACTION_ID, &transaction_id))),
        ("ClientID is white space", ids((CLIENT_ID, "     "), (CLIENT_TRANSACTION_ID, &transaction_id))),
        ("ClientID is negative", ids((CLIENT_ID, "-12345"), (CLIENT_TRANSACTION_ID, &transaction_id))),
        ("ClientID is a string", ids((CLIENT_ID, "asdasd"), (CLIENT_TRANSACTION_ID, &transaction_id))),
        ("ClientTransactionID is empty", ids((CLIENT_ID, &client_id), (CLIENT_TRANSACTION_ID, ""))),
        ("ClientTransactionID is white space", ids((CLIENT_ID, &client_id), (CLIENT_TRANSACTION_ID, "     "))),
        ("ClientTransactionID is negative", ids((CLIENT_ID, &client_id), (CLIENT_TRANSACTION_ID, "-67890"))),
        ("ClientTransactionID is a string", ids((CLIENT_ID, &client_id), (CLIENT_TRANSACTION_ID, "qweqwe"))),
    ];

    cases
        .into_iter()
        .map(|(label, base)| {
            let parameters = with_business(base, business.iter().map(BusinessParameter::as_parameter));
            Variant::new(label, parameters, ExpectedStatusSet::bad_request()).accepting_invalid_value()
        })
        .collect()
}

/// Build the full variant family for a member taking up to two arguments
pub fn family(verb: HttpVerb, business: &[BusinessParameter]) -> ConformResult<Vec<Variant>> {
    if business.len() > 2 {
        return Err(ConformError::InvalidValue(format!(
            "variant families take at most two parameters, got {}",
            business.len()
        )));
    }
    Ok(build_family(verb, business))
}

fn build_family(verb: HttpVerb, business: &[BusinessParameter]) -> Vec<Variant> {
    let get = verb.is_get();
    let names: Vec<&str> = business.iter().map(|p| p.name.as_str()).collect();
    let correct = || business.iter().map(BusinessParameter::as_parameter);
    let mut variants = Vec::new();

    let (good_label, extra_label) = match (names.as_slice(), get) {
        ([], true) => (
            "Good ClientID and ClientTransactionID casing".to_string(),
            "Good ClientID and ClientTransactionID casing with additional parameter".to_string(),
        ),
        ([], false) => (
            "Good ID name casing".to_string(),
            "Good ID casing + extra parameter".to_string(),
        ),
        ([one], true) => (
            format!("Parameter {} (Good casing)", one),
            format!("Parameter {} (Good casing with extra parameter)", one),
        ),
        ([one], false) => (
            format!("Parameter {} (Good casing)", one),
            format!("Parameter {} (Good casing + extra parameter)", one),
        ),
        ([first, second, ..], get) => {
            let noun = if get { "Parameter" } else { "Parameters" };
            (
                format!("{} {} and {} (Good casing)", noun, first, second),
                format!("{} {} and {} (Good casing with extra parameter)", noun, first, second),
            )
        }
    };

    variants.push(Variant::new(good_label, with_business(ids_ok(), correct()), ExpectedStatusSet::ok()));

    let mut extra = ids_ok();
    extra.push(Parameter::new(EXTRA_PARAMETER_NAME, EXTRA_PARAMETER_VALUE));
    variants.push(Variant::new(extra_label, with_business(extra, correct()), ExpectedStatusSet::ok()));

    for (index, parameter) in business.iter().enumerate() {
        if !parameter.test_bad_value {
            continue;
        }
        let parameters = with_business(
            ids_ok(),
            business.iter().enumerate().map(|(i, p)| {
                if i == index {
                    Parameter::new(&p.name, BAD_PARAMETER_VALUE)
                } else {
                    p.as_parameter()
                }
            }),
        );
        variants.push(
            Variant::new(
                format!("Parameter {} (Bad value)", parameter.name),
                parameters,
                ExpectedStatusSet::bad_request(),
            )
            .accepting_invalid_value(),
        );
    }

    // An inverted name is an unknown parameter: ignored on GET, a missing argument on PUT
    for (index, parameter) in business.iter().enumerate() {
        let parameters = with_business(
            ids_ok(),
            business.iter().enumerate().map(|(i, p)| {
                if i == index {
                    Parameter::new(invert_casing(&p.name), &p.value)
                } else {
                    p.as_parameter()
                }
            }),
        );
        let (label, expected) = if get {
            (format!("Parameter {} (Inverted casing)", parameter.name), ExpectedStatusSet::ok())
        } else {
            (format!("Parameter {} (Bad casing)", parameter.name), ExpectedStatusSet::bad_request())
        };
        variants.push(Variant::new(label, parameters, expected));
    }

    let client_id = TEST_CLIENT_ID.to_string();
    let transaction_id = TEST_TRANSACTION_ID.to_string();
    let lower_client_id = ids(
        (&CLIENT_ID.to_lowercase(), &client_id),
        (CLIENT_TRANSACTION_ID, &transaction_id),
    );
    let lower_transaction_id = ids(
        (CLIENT_ID, &client_id),
        (&CLIENT_TRANSACTION_ID.to_lowercase(), &transaction_id),
    );

    let prefix = if get { "Different" } else { "Bad" };
    variants.push(Variant::new(
        format!("{} ClientID casing", prefix),
        with_business(lower_client_id, correct()),
        ExpectedStatusSet::ok(),
    ));

    let transaction_casing = Variant::new(
        format!("{} ClientTransactionID casing", prefix),
        with_business(lower_transaction_id, correct()),
        ExpectedStatusSet::ok(),
    );
    variants.push(if get {
        transaction_casing
    } else {
        transaction_casing.with_badly_cased_transaction_id()
    });

    variants.extend(bad_id_values(business));
    variants
}

pub fn get_no_parameters() -> Vec<Variant> {
    build_family(HttpVerb::Get, &[])
}

pub fn get_one_parameter(parameter: BusinessParameter) -> Vec<Variant> {
    build_family(HttpVerb::Get, &[parameter])
}

pub fn get_two_parameters(first: BusinessParameter, second: BusinessParameter) -> Vec<Variant> {
    build_family(HttpVerb::Get, &[first, second])
}

pub fn put_no_parameters() -> Vec<Variant> {
    build_family(HttpVerb::Put, &[])
}

pub fn put_one_parameter(parameter: BusinessParameter) -> Vec<Variant> {
    build_family(HttpVerb::Put, &[parameter])
}

pub fn put_two_parameters(first: BusinessParameter, second: BusinessParameter) -> Vec<Variant> {
    build_family(HttpVerb::Put, &[first, second])
}
