//! Contract tests for table-reference binding and EXECUTE parameter binding.

mod execute_contract;
mod table_ref_contract;
