mod dispatcher;
mod orchestrator;
mod trial;

use h3_storm::params::TrialParameters;

pub fn addresses(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

pub fn quiet_params() -> TrialParameters {
    TrialParameters::builder()
        .quiet(true)
        .build()
        .expect("default parameters should be valid")
}
