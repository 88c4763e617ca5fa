//! The workspace entities with live sync.

use std::fmt;
use std::str::FromStr;

use crew_live_query::LiveQueryError;

/// Business entities whose tables emit change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
	Companies,
	CompanyContacts,
	Contracts,
	Deals,
	TimeEntries,
	Campaigns,
}

impl Entity {
	pub const ALL: [Entity; 6] = [
		Entity::Companies,
		Entity::CompanyContacts,
		Entity::Contracts,
		Entity::Deals,
		Entity::TimeEntries,
		Entity::Campaigns,
	];

	/// Database table carrying this entity's rows.
	pub fn table_name(self) -> &'static str {
		match self {
			Entity::Companies => "companies",
			Entity::CompanyContacts => "company_contacts",
			Entity::Contracts => "contracts",
			Entity::Deals => "deals",
			Entity::TimeEntries => "time_entries",
			Entity::Campaigns => "campaigns",
		}
	}

	/// Table names accepted by the subscription registry.
	pub fn table_names() -> impl Iterator<Item = &'static str> {
		Self::ALL.into_iter().map(Entity::table_name)
	}
}

impl fmt::Display for Entity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.table_name())
	}
}

impl FromStr for Entity {
	type Err = LiveQueryError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|entity| entity.table_name() == s)
			.ok_or_else(|| LiveQueryError::UnknownTable(s.to_owned()))
	}
}
