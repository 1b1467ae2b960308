use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;

use super::Store;
use crate::cfg::Pc;
use crate::error::{FuzzError, Result};
use crate::model::{
    Contract, ContractId, Function, FunctionId, Task, TaskId, TaskStatus, Transaction,
    TransactionId, TransactionStatus,
};

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<TaskId, Task>,
    contracts: BTreeMap<ContractId, Contract>,
    functions: Vec<Function>,
    transactions: Vec<Transaction>,
    transaction_index: HashMap<TransactionId, usize>,
}

impl Tables {
    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| FuzzError::not_found("task", id))
    }

    fn transaction_mut(&mut self, id: TransactionId) -> Result<&mut Transaction> {
        let idx = *self
            .transaction_index
            .get(&id)
            .ok_or_else(|| FuzzError::not_found("transaction", id))?;
        Ok(&mut self.transactions[idx])
    }

    fn insert_transaction(&mut self, transaction: Transaction) {
        self.transaction_index
            .insert(transaction.id, self.transactions.len());
        self.transactions.push(transaction);
    }
}

/// A [`Store`] kept entirely in memory.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn create_task(&self, task: Task) -> Result<()> {
        self.tables.write().tasks.insert(task.id, task);
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> Result<Task> {
        self.tables
            .read()
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| FuzzError::not_found("task", id))
    }

    fn update_task(&self, task: &Task) -> Result<()> {
        *self.tables.write().task_mut(task.id)? = task.clone();
        Ok(())
    }

    fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task> {
        let mut tables = self.tables.write();
        let task = tables.task_mut(id)?;
        task.status = status;
        Ok(task.clone())
    }

    fn merge_executed_instructions(&self, id: TaskId, executed: &BTreeSet<Pc>) -> Result<Task> {
        let mut tables = self.tables.write();
        let task = tables.task_mut(id)?;
        task.merge_executed(executed);
        Ok(task.clone())
    }

    fn running_tasks(&self) -> Result<Vec<Task>> {
        Ok(self
            .tables
            .read()
            .tasks
            .values()
            .filter(|task| task.is_running())
            .cloned()
            .collect())
    }

    fn create_contract(&self, contract: Contract) -> Result<()> {
        self.tables.write().contracts.insert(contract.id, contract);
        Ok(())
    }

    fn get_contract(&self, id: ContractId) -> Result<Contract> {
        self.tables
            .read()
            .contracts
            .get(&id)
            .cloned()
            .ok_or_else(|| FuzzError::not_found("contract", id))
    }

    fn update_contract(&self, contract: &Contract) -> Result<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .contracts
            .get_mut(&contract.id)
            .ok_or_else(|| FuzzError::not_found("contract", contract.id))?;
        *stored = contract.clone();
        Ok(())
    }

    fn find_contract_by_task(&self, task_id: TaskId) -> Result<Contract> {
        self.tables
            .read()
            .contracts
            .values()
            .find(|contract| contract.task_id == task_id)
            .cloned()
            .ok_or_else(|| FuzzError::not_found("contract of task", task_id))
    }

    fn create_functions(&self, functions: Vec<Function>) -> Result<()> {
        self.tables.write().functions.extend(functions);
        Ok(())
    }

    fn get_function(&self, id: FunctionId) -> Result<Function> {
        self.tables
            .read()
            .functions
            .iter()
            .find(|function| function.id == id)
            .cloned()
            .ok_or_else(|| FuzzError::not_found("function", id))
    }

    fn functions_by_contract(&self, contract_id: ContractId) -> Result<Vec<Function>> {
        Ok(self
            .tables
            .read()
            .functions
            .iter()
            .filter(|function| function.contract_id == contract_id)
            .cloned()
            .collect())
    }

    fn find_constructor(&self, contract_id: ContractId) -> Result<Function> {
        self.tables
            .read()
            .functions
            .iter()
            .find(|function| function.contract_id == contract_id && function.is_constructor)
            .cloned()
            .ok_or_else(|| FuzzError::not_found("constructor of contract", contract_id))
    }

    fn create_transaction(&self, transaction: Transaction) -> Result<()> {
        self.tables.write().insert_transaction(transaction);
        Ok(())
    }

    fn bulk_create_transactions(&self, transactions: Vec<Transaction>) -> Result<()> {
        let mut tables = self.tables.write();
        for transaction in transactions {
            tables.insert_transaction(transaction);
        }
        Ok(())
    }

    fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        let tables = self.tables.read();
        tables
            .transaction_index
            .get(&id)
            .map(|&idx| tables.transactions[idx].clone())
            .ok_or_else(|| FuzzError::not_found("transaction", id))
    }

    fn update_transaction(&self, transaction: &Transaction) -> Result<()> {
        *self.tables.write().transaction_mut(transaction.id)? = transaction.clone();
        Ok(())
    }

    fn bulk_update_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        let mut tables = self.tables.write();
        // Validate first so a missing record leaves the batch untouched.
        if let Some(missing) = transactions
            .iter()
            .find(|tx| !tables.transaction_index.contains_key(&tx.id))
        {
            return Err(FuzzError::not_found("transaction", missing.id));
        }
        for transaction in transactions {
            *tables.transaction_mut(transaction.id)? = transaction.clone();
        }
        Ok(())
    }

    fn transactions_by_task(&self, task_id: TaskId) -> Result<Vec<Transaction>> {
        Ok(self
            .tables
            .read()
            .transactions
            .iter()
            .filter(|tx| tx.task_id == task_id)
            .cloned()
            .collect())
    }

    fn transaction_by_hash(&self, hash: &str) -> Result<Transaction> {
        self.tables
            .read()
            .transactions
            .iter()
            .find(|tx| tx.blockchain_hash.as_deref() == Some(hash))
            .cloned()
            .ok_or_else(|| FuzzError::not_found("transaction with hash", hash))
    }

    fn recent_done_transactions(
        &self,
        function_id: FunctionId,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let mut done: Vec<Transaction> = self
            .tables
            .read()
            .transactions
            .iter()
            .filter(|tx| tx.function_id == function_id && tx.status == TransactionStatus::Done)
            .cloned()
            .collect();
        // Later insertions win ties on equal timestamps.
        done.reverse();
        done.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        done.truncate(limit);
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::FuzzingType;

    fn done_at(task_id: TaskId, function_id: FunctionId, secs: i64) -> Transaction {
        let mut tx = Transaction::new(
            task_id,
            function_id,
            vec![secs.to_string()],
            Utc.timestamp_opt(secs, 0).unwrap(),
        );
        tx.status = TransactionStatus::Done;
        tx
    }

    #[test]
    fn missing_records_are_not_found() {
        let store = InMemoryStore::new();
        assert_matches!(
            store.get_task(TaskId::new()),
            Err(FuzzError::NotFound { entity: "task", .. })
        );
        assert_matches!(
            store.transaction_by_hash("0xdead"),
            Err(FuzzError::NotFound { .. })
        );
    }

    #[test]
    fn recent_done_transactions_are_newest_first() {
        let store = InMemoryStore::new();
        let task = Task::new(FuzzingType::Greybox, vec![], Duration::from_secs(60));
        let function_id = FunctionId::new();
        let mut pending = done_at(task.id, function_id, 50);
        pending.status = TransactionStatus::Running;
        store
            .bulk_create_transactions(vec![
                done_at(task.id, function_id, 10),
                done_at(task.id, function_id, 30),
                done_at(task.id, FunctionId::new(), 40),
                pending,
                done_at(task.id, function_id, 20),
            ])
            .unwrap();

        let recent = store.recent_done_transactions(function_id, 2).unwrap();
        let inputs: Vec<_> = recent.iter().map(|tx| tx.inputs[0].as_str()).collect();
        assert_eq!(inputs, ["30", "20"]);
    }

    #[test]
    fn bulk_update_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let task_id = TaskId::new();
        let mut known = done_at(task_id, FunctionId::new(), 1);
        store.create_transaction(known.clone()).unwrap();

        known.blockchain_hash = Some("0x01".to_string());
        let unknown = done_at(task_id, FunctionId::new(), 2);
        assert!(store.bulk_update_transactions(&[known.clone(), unknown]).is_err());
        assert_eq!(store.get_transaction(known.id).unwrap().blockchain_hash, None);

        store.bulk_update_transactions(&[known.clone()]).unwrap();
        assert_eq!(store.transaction_by_hash("0x01").unwrap().id, known.id);
    }

    #[test]
    fn single_field_updates_leave_the_rest_of_the_task_alone() {
        let store = InMemoryStore::new();
        let mut task = Task::new(FuzzingType::Greybox, vec![], Duration::from_secs(60));
        task.status = TaskStatus::Running;
        let id = task.id;
        store.create_task(task).unwrap();

        store
            .merge_executed_instructions(id, &BTreeSet::from([1, 2]))
            .unwrap();
        let done = store.update_task_status(id, TaskStatus::Done).unwrap();
        assert_eq!(done.aggregated_executed_instructions, BTreeSet::from([1, 2]));

        let merged = store
            .merge_executed_instructions(id, &BTreeSet::from([3]))
            .unwrap();
        assert_eq!(merged.status, TaskStatus::Done);
        assert_eq!(merged.aggregated_executed_instructions, BTreeSet::from([1, 2, 3]));
        assert_matches!(
            store.update_task_status(TaskId::new(), TaskStatus::Done),
            Err(FuzzError::NotFound { entity: "task", .. })
        );
    }
}
