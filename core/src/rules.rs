//! Invalidation rules per entity.
//!
//! The query names here must match the cache keys the UI registers its
//! queries under. Companies serve two list queries (the picker and the full
//! list view), and company contacts are joined into their company's detail
//! view, so a contact change also poisons `["company", <company_id>]`.

use crew_live_query::TableRule;

use crate::entity::Entity;

pub fn for_entity(entity: Entity) -> TableRule {
	match entity {
		Entity::Companies => TableRule::new()
			.list("companyList")
			.list("companies")
			.detail("company"),
		Entity::CompanyContacts => TableRule::new()
			.list("companyContacts")
			.detail("companyContact")
			.link("company_id", "company"),
		Entity::Contracts => TableRule::new().list("contracts").detail("contract"),
		Entity::Deals => TableRule::new().list("deals").detail("deal"),
		Entity::TimeEntries => TableRule::new().list("timeEntries").detail("timeEntry"),
		Entity::Campaigns => TableRule::new().list("campaigns").detail("campaign"),
	}
}
