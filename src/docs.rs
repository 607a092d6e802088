use crate::api::advance_deduction::AdvanceDeductionCommand;
use crate::api::attendance_type::AttendanceTypeCommand;
use crate::api::client_type::ClientTypeListResponse;
use crate::api::salary_slip::{DeductionLine, SalarySlip, SlipSummary};
use crate::api::supervisor_site::{AssignSummary, SupervisorSiteCommand};
use crate::model::advance_payment::{AdvanceDeductionTransaction, AdvancePayment, AdvanceStatus};
use crate::model::attendance_type::AttendanceType;
use crate::model::client_type::ClientType;
use crate::model::salary_record::{DisbursementStatus, SalaryRecord};
use crate::model::site::{AssignedSite, Site};
use crate::reconcile::report::{
    AdvanceHistoryEntry, BalanceAdjustment, ConsistencyIssue, CreatedTransaction,
    DeductionReport, MonthReport, RepairOutcome, RepairSummary,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll Admin API",
        version = "1.0.0",
        description = r#"
## Payroll administration

Action endpoints for the payroll side of the HR backend. Each resource takes
an `action` query parameter on GET and an `action` field in the JSON body on POST.

### Advance deductions
- Verify the advance deduction recorded on a salary record
- Advance payment history per employee
- Month-wide consistency check
- Repair missing deduction transactions (Admin)

### Reference data
- Attendance types, client types, supervisor site assignment, salary slips

### Response format
`{"success": true, "data": ...}` on success, `{"success": false, "message": "..."}` on failure.

Endpoints under `/api` require a **JWT Bearer** access token.
"#,
    ),
    paths(
        crate::api::advance_deduction::query_advance_deductions,
        crate::api::advance_deduction::command_advance_deductions,

        crate::api::attendance_type::query_attendance_types,
        crate::api::attendance_type::command_attendance_types,

        crate::api::client_type::query_client_types,

        crate::api::salary_slip::query_salary_slips,

        crate::api::supervisor_site::query_supervisor_sites,
        crate::api::supervisor_site::command_supervisor_sites
    ),
    components(
        schemas(
            AdvanceDeductionCommand,
            DeductionReport,
            ConsistencyIssue,
            AdvanceHistoryEntry,
            MonthReport,
            RepairOutcome,
            RepairSummary,
            CreatedTransaction,
            BalanceAdjustment,
            SalaryRecord,
            DisbursementStatus,
            AdvancePayment,
            AdvanceStatus,
            AdvanceDeductionTransaction,
            AttendanceType,
            AttendanceTypeCommand,
            ClientType,
            ClientTypeListResponse,
            SalarySlip,
            DeductionLine,
            SlipSummary,
            Site,
            AssignedSite,
            SupervisorSiteCommand,
            AssignSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Advance deductions", description = "Advance deduction reconciliation APIs"),
        (name = "Attendance types", description = "Attendance type management APIs"),
        (name = "Client types", description = "Client type lookup APIs"),
        (name = "Salary slips", description = "Salary slip APIs"),
        (name = "Supervisor sites", description = "Supervisor site assignment APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
