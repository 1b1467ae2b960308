use std::collections::BTreeSet;

use crate::cfg::Pc;
use crate::error::Result;
use crate::model::{
    Contract, ContractId, Function, FunctionId, Task, TaskId, TaskStatus, Transaction,
    TransactionId,
};

/// Persistence of the campaign records.
///
/// Every pipeline stage commits its own changes; the store is not expected to
/// offer transactions spanning several calls. Task fields that several stages
/// change concurrently have their own single-field updates.
pub trait Store: Send + Sync {
    fn create_task(&self, task: Task) -> Result<()>;

    fn get_task(&self, id: TaskId) -> Result<Task>;

    fn update_task(&self, task: &Task) -> Result<()>;

    /// Sets the status of a task and leaves every other field alone.
    fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task>;

    /// Adds `executed` to the aggregated executed instructions of a task and
    /// leaves every other field alone. Returns the updated task.
    fn merge_executed_instructions(&self, id: TaskId, executed: &BTreeSet<Pc>) -> Result<Task>;

    fn running_tasks(&self) -> Result<Vec<Task>>;

    fn create_contract(&self, contract: Contract) -> Result<()>;

    fn get_contract(&self, id: ContractId) -> Result<Contract>;

    fn update_contract(&self, contract: &Contract) -> Result<()>;

    fn find_contract_by_task(&self, task_id: TaskId) -> Result<Contract>;

    fn create_functions(&self, functions: Vec<Function>) -> Result<()>;

    fn get_function(&self, id: FunctionId) -> Result<Function>;

    fn functions_by_contract(&self, contract_id: ContractId) -> Result<Vec<Function>>;

    fn find_constructor(&self, contract_id: ContractId) -> Result<Function>;

    fn create_transaction(&self, transaction: Transaction) -> Result<()>;

    fn bulk_create_transactions(&self, transactions: Vec<Transaction>) -> Result<()>;

    fn get_transaction(&self, id: TransactionId) -> Result<Transaction>;

    fn update_transaction(&self, transaction: &Transaction) -> Result<()>;

    fn bulk_update_transactions(&self, transactions: &[Transaction]) -> Result<()>;

    /// Transactions of a task in creation order.
    fn transactions_by_task(&self, task_id: TaskId) -> Result<Vec<Transaction>>;

    fn transaction_by_hash(&self, hash: &str) -> Result<Transaction>;

    /// The `limit` most recent `Done` transactions of a function, newest first.
    fn recent_done_transactions(
        &self,
        function_id: FunctionId,
        limit: usize,
    ) -> Result<Vec<Transaction>>;
}
