use super::{CsvReporter, HumanReporter, JsonSummaryReporter, Reporter};

pub fn registered_reporters() -> Vec<Box<dyn Reporter>> {
	vec![
		Box::new(HumanReporter),
		Box::new(JsonSummaryReporter),
		Box::new(CsvReporter),
	]
}

pub fn reporter(name: &str) -> Option<Box<dyn Reporter>> {
	registered_reporters()
		.into_iter()
		.find(|reporter| reporter.name() == name)
}
